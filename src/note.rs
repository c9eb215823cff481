//! # Note
//!
//! A fully resolved `Note`: a tone struck in a particular way,
//! for a particular duration, bound to a position. Construction validates
//! the `(pitch, octave, stroke, duration, rest_after)` tuple against the
//! position's valid-note table — every `Note` in a score corresponds to
//! exactly one row of its instrument's valid-note table, enforced at the
//! type boundary rather than checked later. A `Note` is only ever produced
//! by [`Note::cast`] or [`Note::filler`], never assembled field by field.

use crate::error::{GamelanError, Location};
use crate::position::Position;
use crate::tone::{Pitch, Stroke, Tone};

/// One row of a position's valid-note table: a derived allowable
/// `(pitch, octave, stroke, duration, rest_after)` tuple. Supplied by
/// [`crate::settings::RunSettings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidNoteEntry {
    pub pitch: Pitch,
    pub octave: Option<i8>,
    pub stroke: Stroke,
    pub duration: f64,
    pub rest_after: f64,
}

/// A fully resolved note, bound to a position and validated against that
/// position's valid-note table at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub position: Position,
    pub tone: Tone,
    pub stroke: Stroke,
    pub duration: f64,
    pub rest_after: f64,
    /// Original symbol text, kept for diagnostics and the notation
    /// round-trip (`notation::score_to_notation`).
    pub symbol: String,
    /// Ordered modifier characters as parsed, kept for round-tripping.
    pub modifiers: Vec<char>,
    pub velocity: u8,
    /// Concrete MIDI note numbers this note plays (usually one; a few
    /// percussive strokes on multi-key instruments emit more than one).
    pub midi_notes: Vec<u8>,
    pub sample_file: Option<String>,
}

impl Note {
    /// Total duration including the non-sounding rest that follows it:
    /// `duration + rest_after`.
    pub fn total_duration(&self) -> f64 {
        self.duration + self.rest_after
    }

    /// Construct a Note, validating it against the position's valid-note
    /// table. This is the single production point for `Note` values other
    /// than the builder-internal defaults (`Stroke::Extension` /
    /// `Stroke::Silence` sustains/rests, which are always valid by
    /// construction and do not need a table lookup).
    pub fn cast(
        position: Position,
        tone: Tone,
        stroke: Stroke,
        duration: f64,
        rest_after: f64,
        symbol: String,
        modifiers: Vec<char>,
        velocity: u8,
        valid_notes: &[ValidNoteEntry],
        location: Location,
    ) -> Result<Note, GamelanError> {
        let matches = valid_notes.iter().any(|entry| {
            entry.pitch == tone.pitch
                && entry.octave == tone.octave
                && entry.stroke == stroke
                && (entry.duration - duration).abs() < 1e-9
                && (entry.rest_after - rest_after).abs() < 1e-9
        });
        if !matches {
            return Err(GamelanError::Range {
                location,
                message: format!(
                    "{symbol:?} ({tone:?}, {stroke:?}, duration={duration}, rest_after={rest_after}) \
                     is not in {position}'s valid-note table"
                ),
            });
        }
        Ok(Note {
            position,
            tone,
            stroke,
            duration,
            rest_after,
            symbol,
            modifiers,
            velocity,
            midi_notes: Vec::new(),
            sample_file: None,
        })
    }

    /// Construct a non-sounding continuation (sustain or rest) of the given
    /// duration. These never fail the valid-note check: treats
    /// `EXTENSION`/`SILENCE` padding as structural filler the builder
    /// inserts directly, not a symbol cast from source text.
    pub fn filler(position: Position, stroke: Stroke, duration: f64) -> Note {
        debug_assert!(stroke.is_non_sounding());
        Note {
            position,
            tone: Tone::new(Pitch::None, None),
            stroke,
            duration,
            rest_after: 0.0,
            symbol: if stroke == Stroke::Extension {
                "-".to_string()
            } else {
                ".".to_string()
            },
            modifiers: Vec::new(),
            velocity: 0,
            midi_notes: Vec::new(),
            sample_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<ValidNoteEntry> {
        vec![ValidNoteEntry {
            pitch: Pitch::Dong,
            octave: Some(1),
            stroke: Stroke::Open,
            duration: 1.0,
            rest_after: 0.0,
        }]
    }

    #[test]
    fn cast_accepts_tuple_present_in_table() {
        let note = Note::cast(
            Position::PemadePolos,
            Tone::new(Pitch::Dong, Some(1)),
            Stroke::Open,
            1.0,
            0.0,
            "o".to_string(),
            vec![],
            90,
            &table(),
            Location::default(),
        );
        assert!(note.is_ok());
    }

    #[test]
    fn cast_rejects_tuple_absent_from_table() {
        let note = Note::cast(
            Position::PemadePolos,
            Tone::new(Pitch::Dong, Some(2)),
            Stroke::Open,
            1.0,
            0.0,
            "o<".to_string(),
            vec!['<'],
            90,
            &table(),
            Location::default(),
        );
        assert!(matches!(note, Err(GamelanError::Range { .. })));
    }

    #[test]
    fn filler_has_zero_rest_after_and_is_non_sounding() {
        let note = Note::filler(Position::Kempli, Stroke::Extension, 3.0);
        assert_eq!(note.total_duration(), 3.0);
        assert!(note.stroke.is_non_sounding());
    }
}
