//! # Validator
//!
//! Runs the four structural/range/style checks against a fully built
//! [`Score`], each producing a remaining-invalid / corrected / ignored
//! outcome per location, honoring per-beat `VALIDATION { ignore }`
//! overrides (`Beat::ignores`). Every autocorrection is logged at info
//! level through [`Diagnostics`] rather than silently applied.

use crate::error::{Diagnostics, GamelanError, Location};
use crate::model::{BeatId, Score, ValidationCheck};
use crate::note::Note;
use crate::rules::{self, kempyung_of};
use crate::settings::{RuleKind, RunSettings};
use crate::tone::Stroke;

/// One check's outcome at one location.
#[derive(Debug, Clone)]
pub struct Finding {
    pub check: ValidationCheck,
    pub location: Location,
    pub message: String,
}

/// The three outcome buckets every check reports into.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub remaining_invalid: Vec<Finding>,
    pub corrected: Vec<Finding>,
    pub ignored: Vec<Finding>,
}

impl ValidationReport {
    fn push(&mut self, bucket: Outcome, finding: Finding) {
        match bucket {
            Outcome::Invalid => self.remaining_invalid.push(finding),
            Outcome::Corrected => self.corrected.push(finding),
            Outcome::Ignored => self.ignored.push(finding),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Invalid,
    Corrected,
    Ignored,
}

/// Runs all four checks in order. `autocorrect` gates whether
/// correctable checks (equal measure length, kempyung) are allowed to
/// mutate `score`; when false they report as remaining-invalid instead.
pub fn validate(score: &mut Score, settings: &RunSettings, autocorrect: bool, diagnostics: &mut Diagnostics) -> ValidationReport {
    let mut report = ValidationReport::default();
    check_beat_length(score, &mut report, diagnostics);
    check_equal_measure_length(score, settings, autocorrect, &mut report, diagnostics);
    check_in_range(score, settings, &mut report, diagnostics);
    check_kempyung(score, settings, autocorrect, &mut report, diagnostics);
    report
}

fn all_beat_ids(score: &Score) -> Vec<BeatId> {
    score.gongans.iter().flat_map(|g| g.beats.iter().copied()).collect()
}

fn is_power_of_two(value: f64) -> bool {
    if value <= 0.0 || !value.is_finite() {
        return false;
    }
    let rounded = value.round();
    if (value - rounded).abs() > 1e-9 {
        return false;
    }
    let n = rounded as i64;
    n > 0 && (n & (n - 1)) == 0
}

/// Check 1: for REGULAR gongans, beat.duration must be a power of two.
/// Never autocorrectable.
fn check_beat_length(score: &Score, report: &mut ValidationReport, diagnostics: &mut Diagnostics) {
    for gongan in &score.gongans {
        if gongan.kind != crate::model::GonganType::Regular {
            continue;
        }
        for &beat_id in &gongan.beats {
            let beat = score.beat(beat_id);
            let location = Location { gongan: Some(gongan.id), beat: Some(beat_id.0 as usize), position: None, line: None };
            if beat.ignores(ValidationCheck::BeatLength) {
                report.push(Outcome::Ignored, Finding { check: ValidationCheck::BeatLength, location, message: "beat length check ignored".to_string() });
                continue;
            }
            if !is_power_of_two(beat.duration) {
                let message = format!("beat duration {} is not a power of two", beat.duration);
                diagnostics.error(GamelanError::Structure { location: location.clone(), message: message.clone() });
                report.push(Outcome::Invalid, Finding { check: ValidationCheck::BeatLength, location, message });
            }
        }
    }
}

/// Check 2: within each beat, every measure's pass must sum to
/// `beat.duration`. Autocorrects shorthand positions by extending with
/// EXTENSION rests; everything else that mismatches
/// is reported and left alone.
fn check_equal_measure_length(score: &mut Score, settings: &RunSettings, autocorrect: bool, report: &mut ValidationReport, diagnostics: &mut Diagnostics) {
    let shorthand = &settings.shorthand_positions;
    for beat_id in all_beat_ids(score) {
        let beat_duration = score.beat(beat_id).duration;
        let gongan_id = score.beat(beat_id).gongan;
        if score.beat(beat_id).ignores(ValidationCheck::EqualMeasureLength) {
            let location = Location { gongan: Some(gongan_id), beat: Some(beat_id.0 as usize), position: None, line: None };
            report.push(Outcome::Ignored, Finding { check: ValidationCheck::EqualMeasureLength, location, message: "equal measure length check ignored".to_string() });
            continue;
        }

        let positions: Vec<_> = score.beat(beat_id).measures.keys().copied().collect();
        for position in positions {
            let beat = score.beat_mut(beat_id);
            let measure = beat.measures.get_mut(&position).unwrap();
            let pass_ids: Vec<i32> = measure.passes.keys().copied().collect();
            for pass_id in pass_ids {
                let pass = measure.passes.get_mut(&pass_id).unwrap();
                let total = pass.total_duration();
                if (total - beat_duration).abs() < 1e-9 {
                    continue;
                }
                let location = Location { gongan: Some(gongan_id), beat: Some(beat_id.0 as usize), position: Some(position), line: None };
                let remainder = beat_duration - total;
                if autocorrect && remainder > 1e-9 && shorthand.contains(&position) {
                    pass.notes.push(Note::filler(position, Stroke::Extension, remainder));
                    diagnostics.info(&location, &format!("extended {position} with a {remainder}-duration EXTENSION to reach beat duration {beat_duration}"));
                    report.push(Outcome::Corrected, Finding { check: ValidationCheck::EqualMeasureLength, location, message: "extended with EXTENSION rest".to_string() });
                } else {
                    let message = format!("measure for {position} totals {total}, expected {beat_duration}");
                    diagnostics.error(GamelanError::Structure { location: location.clone(), message: message.clone() });
                    report.push(Outcome::Invalid, Finding { check: ValidationCheck::EqualMeasureLength, location, message });
                }
            }
        }
    }
}

/// Check 3: every sounding note's (pitch, octave, stroke) must appear in
/// its position's valid-note set. Never autocorrectable.
fn check_in_range(score: &Score, settings: &RunSettings, report: &mut ValidationReport, diagnostics: &mut Diagnostics) {
    for beat_id in all_beat_ids(score) {
        let beat = score.beat(beat_id);
        let gongan_id = beat.gongan;
        let ignored = beat.ignores(ValidationCheck::InRange);
        for (position, measure) in &beat.measures {
            let valid_notes = settings.valid_notes.get(*position);
            for pass in measure.passes.values() {
                for note in &pass.notes {
                    if note.stroke.is_non_sounding() {
                        continue;
                    }
                    let in_range = valid_notes.iter().any(|e| e.pitch == note.tone.pitch && e.octave == note.tone.octave && e.stroke == note.stroke);
                    if in_range {
                        continue;
                    }
                    let location = Location { gongan: Some(gongan_id), beat: Some(beat_id.0 as usize), position: Some(*position), line: None };
                    if ignored {
                        report.push(Outcome::Ignored, Finding { check: ValidationCheck::InRange, location, message: "in-range check ignored".to_string() });
                        continue;
                    }
                    let message = format!("{:?} octave {:?} stroke {:?} is not in {position}'s valid-note table", note.tone.pitch, note.tone.octave, note.stroke);
                    diagnostics.error(GamelanError::Range { location: location.clone(), message: message.clone() });
                    report.push(Outcome::Invalid, Finding { check: ValidationCheck::InRange, location, message });
                }
            }
        }
    }
}

/// Check 4: for each configured (polos, sangsih) pair, when both measures
/// are homophonic, every non-rest sangsih tone must equal the kempyung of
/// the corresponding polos tone. Autocorrects by replacing the sangsih note
/// with the canonical kempyung note and rechecking.
fn check_kempyung(score: &mut Score, settings: &RunSettings, autocorrect: bool, report: &mut ValidationReport, diagnostics: &mut Diagnostics) {
    let pairs = settings.kempyung_pairs.pairs.clone();
    for beat_id in all_beat_ids(score) {
        let gongan_id = score.beat(beat_id).gongan;
        if score.beat(beat_id).ignores(ValidationCheck::Kempyung) {
            for &(_, sangsih) in &pairs {
                let location = Location { gongan: Some(gongan_id), beat: Some(beat_id.0 as usize), position: Some(sangsih), line: None };
                report.push(Outcome::Ignored, Finding { check: ValidationCheck::Kempyung, location, message: "kempyung check ignored".to_string() });
            }
            continue;
        }

        for &(polos, sangsih) in &pairs {
            let beat = score.beat(beat_id);
            let (Some(polos_measure), Some(sangsih_measure)) = (beat.measures.get(&polos), beat.measures.get(&sangsih)) else { continue };
            let (Some(polos_pass), Some(sangsih_pass)) = (polos_measure.passes.get(&crate::model::DEFAULT_PASS), sangsih_measure.passes.get(&crate::model::DEFAULT_PASS)) else { continue };
            if polos_pass.notes.len() != sangsih_pass.notes.len() {
                continue;
            }
            let homophonic = polos_pass
                .notes
                .iter()
                .zip(&sangsih_pass.notes)
                .all(|(p, s)| p.stroke == s.stroke && (p.duration - s.duration).abs() < 1e-9 && (p.rest_after - s.rest_after).abs() < 1e-9);
            if !homophonic {
                continue;
            }

            let mismatched_indices: Vec<usize> = polos_pass
                .notes
                .iter()
                .zip(&sangsih_pass.notes)
                .enumerate()
                .filter_map(|(i, (p, s))| {
                    if p.stroke.is_non_sounding() {
                        return None;
                    }
                    let expected = kempyung_of(p.tone)?;
                    if s.tone != expected {
                        Some(i)
                    } else {
                        None
                    }
                })
                .collect();

            let sangsih_valid_notes = settings.valid_notes.get(sangsih);
            for index in mismatched_indices {
                let location = Location { gongan: Some(gongan_id), beat: Some(beat_id.0 as usize), position: Some(sangsih), line: None };
                let polos_note = score.beat(beat_id).measures[&polos].passes[&crate::model::DEFAULT_PASS].notes[index].clone();
                let derived = rules::apply_rule(RuleKind::ExactKempyung, polos_note.tone, polos_note.stroke, polos_note.duration, sangsih_valid_notes);

                match derived {
                    Some(tone) if autocorrect => {
                        let beat = score.beat_mut(beat_id);
                        let sangsih_note = &mut beat.measures.get_mut(&sangsih).unwrap().passes.get_mut(&crate::model::DEFAULT_PASS).unwrap().notes[index];
                        sangsih_note.tone = tone;
                        diagnostics.info(&location, &format!("replaced {sangsih} note at index {index} with its canonical kempyung {tone:?}"));
                        report.push(Outcome::Corrected, Finding { check: ValidationCheck::Kempyung, location, message: "replaced with canonical kempyung".to_string() });
                    }
                    _ => {
                        let message = format!("{sangsih} note at index {index} is not the kempyung of the paired {polos} tone {:?}", polos_note.tone);
                        diagnostics.error(GamelanError::Rule { location: location.clone(), message: message.clone() });
                        report.push(Outcome::Invalid, Finding { check: ValidationCheck::Kempyung, location, message });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar;

    #[test]
    fn regular_gongan_with_non_power_of_two_beat_is_reported() {
        let settings = RunSettings::minimal_for_tests();
        let (raw, _) = grammar::parse("pemade_polos\tioe\n");
        let (mut score, _) = crate::builder::build(raw, &settings);
        let mut diagnostics = Diagnostics::new();
        let report = validate(&mut score, &settings, true, &mut diagnostics);
        assert!(report.remaining_invalid.iter().any(|f| f.check == ValidationCheck::BeatLength));
    }

    #[test]
    fn in_range_check_accepts_every_note_the_builder_produced() {
        let settings = RunSettings::minimal_for_tests();
        let (raw, _) = grammar::parse("pemade_polos\tioeu\n");
        let (mut score, _) = crate::builder::build(raw, &settings);
        let mut diagnostics = Diagnostics::new();
        let report = validate(&mut score, &settings, true, &mut diagnostics);
        assert!(report.remaining_invalid.iter().all(|f| f.check != ValidationCheck::InRange));
    }

    #[test]
    fn kempyung_mismatch_is_autocorrected_to_the_canonical_partner() {
        let settings = RunSettings::minimal_for_tests();
        let (raw, _) = grammar::parse("pemade_polos\to\npemade_sangsih\to\n");
        let (mut score, _) = crate::builder::build(raw, &settings);
        let mut diagnostics = Diagnostics::new();
        let report = validate(&mut score, &settings, true, &mut diagnostics);
        assert!(report.corrected.iter().any(|f| f.check == ValidationCheck::Kempyung));
        let first = score.first_beat().unwrap();
        let polos_tone = score.beat(first).measures[&crate::position::Position::PemadePolos].passes[&crate::model::DEFAULT_PASS].notes[0].tone;
        let sangsih_tone = score.beat(first).measures[&crate::position::Position::PemadeSangsih].passes[&crate::model::DEFAULT_PASS].notes[0].tone;
        assert_eq!(sangsih_tone, kempyung_of(polos_tone).unwrap());
    }
}
