//! # Pipeline driver
//!
//! The single entry point the rest of spec.md §2 calls the "driver": it
//! runs each agent in order (GrammarParser → TagResolver/MetadataBinder/
//! ScoreBuilder → Validator → FlowInterpreter/MidiEmitter), checking
//! `Diagnostics::has_errors()` at each stage boundary and aborting before
//! running the next stage, matching spec.md §7's propagation policy.
//! Generalizes the teacher's flat `compile()` (parse → validate →
//! generate, one `Result` for the whole pipeline) into named stages that
//! each get a chance to accumulate more than one error.

use crate::builder;
use crate::error::Diagnostics;
use crate::flow;
use crate::grammar;
use crate::midi::MidiFile;
use crate::model::Score;
use crate::notation;
use crate::settings::RunSettings;
use crate::validator::{self, ValidationReport};

/// Everything one successful pipeline run produces. Which fields are
/// actually populated is controlled by `RunSettings::options`
/// (`save_midifile`, `save_corrected`).
pub struct CompileOutput {
    pub score: Score,
    pub validation: ValidationReport,
    pub midi: Option<MidiFile>,
    pub corrected_notation: Option<String>,
}

/// Runs the full pipeline against `source`, aborting at the first stage
/// boundary with accumulated errors. On success, returns every artifact
/// `settings.options` asked for; the caller (`main.rs`, or a test) decides
/// what to do with them — this module never touches the filesystem.
pub fn run(source: &str, settings: &RunSettings) -> Result<CompileOutput, Diagnostics> {
    let (raw_gongans, mut diagnostics) = grammar::parse(source);
    if diagnostics.has_errors() {
        return Err(diagnostics);
    }

    let (mut score, build_diagnostics) = builder::build(raw_gongans, settings);
    diagnostics.extend(build_diagnostics);
    if diagnostics.has_errors() {
        return Err(diagnostics);
    }

    let validation = validator::validate(&mut score, settings, settings.options.autocorrect, &mut diagnostics);
    if settings.options.detailed_validation_logging {
        for finding in &validation.corrected {
            diagnostics.info(&finding.location, &format!("autocorrected ({:?}): {}", finding.check, finding.message));
        }
        for finding in &validation.ignored {
            diagnostics.info(&finding.location, &format!("ignored ({:?}): {}", finding.check, finding.message));
        }
    }
    if diagnostics.has_errors() {
        return Err(diagnostics);
    }

    let midi = if settings.options.save_midifile {
        match flow::emit(&score, settings) {
            Ok(file) => Some(file),
            Err(err) => {
                diagnostics.error(err);
                return Err(diagnostics);
            }
        }
    } else {
        None
    };

    let corrected_notation = settings.options.save_corrected.then(|| notation::score_to_notation(&score));

    Ok(CompileOutput { score, validation, midi, corrected_notation })
}

/// Human-readable summary of an aborted run: counts per error kind, per
/// spec.md §7's "driver writes a summary (counts per kind)". `main.rs`
/// prints this to its leveled log sink before exiting non-zero.
pub fn summarize(diagnostics: &Diagnostics) -> String {
    let mut lines = vec![format!("{} error(s):", diagnostics.errors().len())];
    for (kind, count) in diagnostics.error_counts() {
        lines.push(format!("  {kind}: {count}"));
    }
    for err in diagnostics.errors() {
        lines.push(format!("  - {err}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RunSettings;

    #[test]
    fn minimal_score_compiles_through_every_stage() {
        let mut settings = RunSettings::minimal_for_tests();
        settings.options.save_midifile = true;
        settings.options.save_corrected = true;
        let source = "pemade_polos\tioeu\n";

        let output = run(source, &settings).expect("pipeline should succeed");
        assert!(output.validation.remaining_invalid.is_empty());
        assert!(output.midi.is_some());
        assert!(output.corrected_notation.unwrap().contains("ioeu"));
    }

    #[test]
    fn grammar_errors_abort_before_building_a_score() {
        let settings = RunSettings::minimal_for_tests();
        let source = "metadata\t{TEMPO value=}\n";

        let result = run(source, &settings);
        assert!(result.is_err());
        assert!(result.unwrap_err().has_errors());
    }

    #[test]
    fn unresolved_tag_is_reported_by_summarize() {
        let settings = RunSettings::minimal_for_tests();
        let source = "bogus_tag\tioeu\n";

        let diagnostics = run(source, &settings).unwrap_err();
        let summary = summarize(&diagnostics);
        assert!(summary.contains("ResolutionError"));
    }
}
