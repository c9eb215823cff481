//! # Tone and Stroke Vocabulary
//!
//! This module defines the fixed pitch/octave/stroke vocabulary every `Note`
//! in a score is built from.
//!
//! ## Pitch
//! `Pitch` enumerates the five melodic scale steps of the Balinese pentatonic
//! scale (`DING DONG DENG DEUNG DUNG DANG DAING` — seven names because some
//! instruments use the extended seven-tone set) plus the non-melodic
//! percussive pitches used by kendang, gongs and reyong punctuation
//! (`STRIKE`, `BYONG`, `TONG`, ...). Non-melodic pitches never carry an
//! octave; `Tone::octave` is `None` for them by construction.
//!
//! ## Stroke
//! `Stroke` enumerates how a tone is struck or sustained: `OPEN`/`MUTED` for
//! ordinary strokes, `TREMOLO`/`TREMOLO_ACCELERATING` for the two tremolo
//! notations that get expanded into several notes by the score builder, and
//! `EXTENSION`/`SILENCE` for the two non-sounding continuations (sustain vs.
//! rest) used to pad measures out to a beat's duration.

use serde::Deserialize;

/// A melodic or non-melodic pitch. Melodic pitches form the five/seven-tone
/// Balinese scale; the remainder are percussive/non-sounding markers used by
/// specific instrument groups (kendang strokes, gong punctuation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Pitch {
    // Melodic scale steps (Balinese pentatonic + auxiliary tones)
    Ding,
    Dong,
    Deng,
    Deung,
    Dung,
    Dang,
    Daing,
    /// Used only by the `DENGDING` combined grace-note symbol (ding/deng
    /// ambiguity resolved by the follower) — see ScoreBuilder grace handling.
    DengDing,
    // Non-melodic / percussive pitches
    Strike,
    Byong,
    Tong,
    Pak,
    Dag,
    Dug,
    Gir,
    Jet,
    Pek,
    Pur,
    Ka,
    Cung,
    Kung,
    Plak,
    Tut,
    Muted,
    Open,
    None,
}

impl Pitch {
    /// Whether this pitch carries an octave (melodic pitches only).
    pub fn is_melodic(self) -> bool {
        matches!(
            self,
            Pitch::Ding
                | Pitch::Dong
                | Pitch::Deng
                | Pitch::Deung
                | Pitch::Dung
                | Pitch::Dang
                | Pitch::Daing
                | Pitch::DengDing
        )
    }

    /// Index of this pitch within the canonical seven-tone scale sequence,
    /// used by the kempyung interval table to compute "three
    /// scale steps up". Returns `None` for non-melodic pitches.
    pub fn scale_step(self) -> Option<u8> {
        match self {
            Pitch::Ding => Some(0),
            Pitch::Dong => Some(1),
            Pitch::Deng => Some(2),
            Pitch::Deung => Some(3),
            Pitch::Dung => Some(4),
            Pitch::Dang => Some(5),
            Pitch::Daing => Some(6),
            _ => None,
        }
    }

    /// Scale step back to pitch, wrapping modulo 7 (octave is tracked
    /// separately by the caller).
    pub fn from_scale_step(step: i32) -> Pitch {
        match step.rem_euclid(7) {
            0 => Pitch::Ding,
            1 => Pitch::Dong,
            2 => Pitch::Deng,
            3 => Pitch::Deung,
            4 => Pitch::Dung,
            5 => Pitch::Dang,
            _ => Pitch::Daing,
        }
    }
}

/// A pitch together with its octave, where the octave only applies to
/// melodic pitches. Octave is instrument-relative; by convention octave `1`
/// is an instrument's standard middle register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tone {
    pub pitch: Pitch,
    pub octave: Option<i8>,
}

impl Tone {
    pub fn new(pitch: Pitch, octave: Option<i8>) -> Self {
        // Non-melodic pitches never carry an octave, even if one was parsed.
        let octave = if pitch.is_melodic() { octave } else { None };
        Self { pitch, octave }
    }

    /// Scale-step distance to `other`, used by grace-note octave selection
    /// and the kempyung interval table. Treats octave as worth 7 scale
    /// steps. Returns `None` if either tone is non-melodic.
    pub fn scale_step_distance(self, other: Tone) -> Option<i32> {
        let a = self.pitch.scale_step()? as i32 + 7 * self.octave.unwrap_or(0) as i32;
        let b = other.pitch.scale_step()? as i32 + 7 * other.octave.unwrap_or(0) as i32;
        Some(a - b)
    }
}

/// How a tone is struck, muted, sustained, or silenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Stroke {
    Open,
    Muted,
    Abbreviated,
    Tremolo,
    TremoloAccelerating,
    GraceNote,
    Norot,
    Tick1,
    Tick2,
    Kapak,
    Detut,
    Cungkung,
    /// Sustain: the previous sounding note continues through this duration.
    Extension,
    /// Rest: silence for this duration.
    Silence,
    None,
}

impl Stroke {
    /// Non-sounding continuations contribute no new note-on event.
    pub fn is_non_sounding(self) -> bool {
        matches!(self, Stroke::Extension | Stroke::Silence)
    }

    pub fn is_tremolo(self) -> bool {
        matches!(self, Stroke::Tremolo | Stroke::TremoloAccelerating)
    }
}
