//! # RuleEngine
//!
//! Derives the notation for secondary positions from a primary position's
//! measure via tagged rules. Rule selection is a pure function from a
//! sorted set of co-occurring [`Position`]s to a single, unambiguous rule.

use crate::note::ValidNoteEntry;
use crate::position::Position;
use crate::settings::RuleKind;
use crate::tone::{Pitch, Stroke, Tone};

/// Selects which rule applies when `positions` co-occur in the same beat,
/// by their declared priority: exact-suffix pemade/kantilan
/// pairs get EXACT_KEMPYUNG, any two reyong voices get KEMPYUNG, and the
/// fallback for everything else (e.g. unison gangsa casting) is SAME_TONE.
pub fn select_rule(positions: &[Position]) -> RuleKind {
    let is_pemade_pair = positions.contains(&Position::PemadePolos) && positions.contains(&Position::PemadeSangsih);
    let is_kantilan_pair = positions.contains(&Position::KantilanPolos) && positions.contains(&Position::KantilanSangsih);
    if is_pemade_pair || is_kantilan_pair {
        return RuleKind::ExactKempyung;
    }
    let reyong_count = positions
        .iter()
        .filter(|p| p.instrument_type() == crate::position::InstrumentType::Reyong)
        .count();
    if reyong_count >= 2 {
        return RuleKind::Kempyung;
    }
    RuleKind::SameTone
}

/// The kempyung partner of `tone`: three scale steps up in the seven-tone
/// sequence, via a fixed interval table, carrying the octave forward when
/// the shift wraps past the top of the scale. Returns `None` for
/// non-melodic tones.
pub fn kempyung_of(tone: Tone) -> Option<Tone> {
    let step = tone.pitch.scale_step()? as i32 + 7 * tone.octave.unwrap_or(0) as i32;
    let shifted = step + 3;
    let octave = shifted.div_euclid(7);
    Some(Tone::new(Pitch::from_scale_step(shifted), Some(octave as i8)))
}

/// Picks the octave within `valid_notes` closest to `preferred_octave` for
/// `pitch`/`stroke`/`duration`, used to keep a derived tone in the
/// secondary position's standard (or, for the extended-range rules,
/// extended) range.
fn nearest_valid_octave(
    pitch: Pitch,
    stroke: Stroke,
    duration: f64,
    preferred_octave: i8,
    valid_notes: &[ValidNoteEntry],
) -> Option<i8> {
    let mut candidates: Vec<i8> = valid_notes
        .iter()
        .filter(|e| e.pitch == pitch && e.stroke == stroke && (e.duration - duration).abs() < 1e-9)
        .filter_map(|e| e.octave)
        .collect();
    candidates.sort_unstable();
    candidates.dedup();
    candidates.into_iter().min_by_key(|o| (*o as i32 - preferred_octave as i32).abs())
}

/// Applies `rule` to derive a secondary tone from `primary`, constrained to
/// fit `secondary_valid_notes`. Returns `None` when no octave in range
/// accommodates the derived pitch — callers applying KEMPYUNG should fall
/// back to [`RuleKind::SamePitch`] in that case: the same derivation as
/// EXACT_KEMPYUNG, but falling back to SAME_PITCH when the partner is out
/// of range.
pub fn apply_rule(
    rule: RuleKind,
    primary: Tone,
    stroke: Stroke,
    duration: f64,
    secondary_valid_notes: &[ValidNoteEntry],
) -> Option<Tone> {
    match rule {
        RuleKind::SameTone => Some(primary),
        RuleKind::SamePitch | RuleKind::SamePitchExtendedRange => {
            let octave = nearest_valid_octave(primary.pitch, stroke, duration, primary.octave.unwrap_or(0), secondary_valid_notes)?;
            Some(Tone::new(primary.pitch, Some(octave)))
        }
        RuleKind::ExactKempyung => {
            let partner = kempyung_of(primary)?;
            let octave = nearest_valid_octave(partner.pitch, stroke, duration, partner.octave.unwrap_or(0), secondary_valid_notes)?;
            Some(Tone::new(partner.pitch, Some(octave)))
        }
        RuleKind::Kempyung => {
            let partner = kempyung_of(primary)?;
            if let Some(octave) = nearest_valid_octave(partner.pitch, stroke, duration, partner.octave.unwrap_or(0), secondary_valid_notes) {
                return Some(Tone::new(partner.pitch, Some(octave)));
            }
            apply_rule(RuleKind::SamePitch, primary, stroke, duration, secondary_valid_notes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<ValidNoteEntry> {
        let mut entries = Vec::new();
        for octave in 0..=2 {
            for pitch in [Pitch::Ding, Pitch::Dong, Pitch::Deng, Pitch::Deung, Pitch::Dung, Pitch::Dang, Pitch::Daing] {
                entries.push(ValidNoteEntry { pitch, octave: Some(octave), stroke: Stroke::Open, duration: 1.0, rest_after: 0.0 });
            }
        }
        entries
    }

    #[test]
    fn pemade_pair_selects_exact_kempyung() {
        let rule = select_rule(&[Position::PemadePolos, Position::PemadeSangsih]);
        assert_eq!(rule, RuleKind::ExactKempyung);
    }

    #[test]
    fn two_reyong_positions_select_kempyung() {
        let rule = select_rule(&[Position::Reyong1, Position::Reyong2]);
        assert_eq!(rule, RuleKind::Kempyung);
    }

    #[test]
    fn unrelated_positions_default_to_same_tone() {
        let rule = select_rule(&[Position::Ugal, Position::Calung]);
        assert_eq!(rule, RuleKind::SameTone);
    }

    #[test]
    fn kempyung_of_wraps_octave_forward() {
        let dang = Tone::new(Pitch::Dang, Some(1));
        let partner = kempyung_of(dang).unwrap();
        assert_eq!(partner.pitch, Pitch::Deung);
        assert_eq!(partner.octave, Some(2));
    }

    #[test]
    fn exact_kempyung_of_a_measure_already_in_kempyung_form_is_the_identity() {
        let polos = Tone::new(Pitch::Dong, Some(1));
        let expected_sangsih = kempyung_of(polos).unwrap();
        let derived = apply_rule(RuleKind::ExactKempyung, polos, Stroke::Open, 1.0, &table()).unwrap();
        assert_eq!(derived, expected_sangsih);
        let reapplied = apply_rule(RuleKind::ExactKempyung, polos, Stroke::Open, 1.0, &table()).unwrap();
        assert_eq!(reapplied, derived);
    }
}
