//! Integration tests for the gamelan notation compiler.
//!
//! Exercises the pipeline driver end to end, from notation source text
//! through to a `MidiFile` and player manifest, the way `main.rs` drives it,
//! but entirely through the library's public API.

use gamelan_notation::manifest::{self, PartEntry, PlayerManifestEntry};
use gamelan_notation::settings::RunSettings;
use gamelan_notation::{pipeline, GamelanError};
use pretty_assertions::assert_eq;

fn settings() -> RunSettings {
    let mut settings = RunSettings::minimal_for_tests();
    settings.options.save_midifile = true;
    settings.options.save_corrected = true;
    settings
}

#[test]
fn compiles_a_single_gongan_to_midi_and_corrected_notation() {
    let source = "pemade_polos\tioeu\n";
    let output = pipeline::run(source, &settings()).expect("pipeline should succeed");

    assert!(output.validation.remaining_invalid.is_empty());
    let midi = output.midi.expect("save_midifile was requested");
    assert!(midi.to_bytes().starts_with(b"MThd"));
    assert!(output.corrected_notation.unwrap().contains("ioeu"));
}

#[test]
fn gangsa_tag_expands_to_polos_and_sangsih_positions() {
    let source = "gangsa\tioeu\n";
    let output = pipeline::run(source, &settings()).expect("gangsa should resolve to four positions");

    let beat = output.score.beat(output.score.first_beat().unwrap());
    assert!(beat.measures.contains_key(&gamelan_notation::position::Position::PemadePolos));
    assert!(beat.measures.contains_key(&gamelan_notation::position::Position::PemadeSangsih));
    assert!(beat.measures.contains_key(&gamelan_notation::position::Position::KantilanPolos));
    assert!(beat.measures.contains_key(&gamelan_notation::position::Position::KantilanSangsih));
}

#[test]
fn label_and_goto_link_two_gongans_into_a_cycle() {
    let source = "\
metadata\t{LABEL name=A}\n\
pemade_polos\tioeu\n\
\n\
metadata\t{GOTO label=A, frequency=1}\n\
pemade_polos\tuoei\n";

    let output = pipeline::run(source, &settings()).expect("goto should resolve against the earlier label");
    let labeled = output.score.flow.labels.get("A").copied();
    assert!(labeled.is_some());

    let second_gongan_first_beat = output.score.gongans[1].beats[0];
    let goto_target = output.score.beat(second_gongan_first_beat).goto.values().next().copied();
    assert_eq!(goto_target, labeled);
}

#[test]
fn unresolved_instrument_tag_is_reported_as_a_resolution_error() {
    let source = "not_a_real_instrument\tioeu\n";
    let diagnostics = pipeline::run(source, &settings()).expect_err("unknown tag should abort the pipeline");

    assert!(diagnostics.has_errors());
    assert!(diagnostics
        .errors()
        .iter()
        .any(|e| matches!(e, GamelanError::Resolution { .. })));
}

#[test]
fn grammar_error_aborts_before_the_score_builder_runs() {
    let source = "metadata\t{TEMPO value=}\npemade_polos\tioeu\n";
    let diagnostics = pipeline::run(source, &settings()).expect_err("malformed metadata body should be a grammar error");

    assert!(diagnostics
        .errors()
        .iter()
        .any(|e| matches!(e, GamelanError::Grammar { .. })));
}

#[test]
fn pipeline_run_updates_a_player_manifest_like_the_cli_entry_point_does() {
    let output = pipeline::run("pemade_polos\tioeu\n", &settings()).expect("pipeline should succeed");
    let midi_bytes = output.midi.as_ref().unwrap().to_bytes();
    assert!(midi_bytes.starts_with(b"MThd"));

    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join("manifest.json");
    let entry = PlayerManifestEntry {
        title: "Test Gending".to_string(),
        instrumentgroup: "semar pagulingan".to_string(),
        parts: output
            .score
            .active_positions
            .iter()
            .map(|position| PartEntry {
                position: position.short_code().to_string(),
                file: "out.mid".to_string(),
                loop_start: None,
                loop_end: None,
                markers: Vec::new(),
            })
            .collect(),
        pdf: None,
        notation_version: 1,
    };
    manifest::update_manifest(&manifest_path, "test-gending", entry).unwrap();

    let text = std::fs::read_to_string(&manifest_path).unwrap();
    let loaded = manifest::PlayerManifest::from_json(&text).unwrap();
    assert_eq!(loaded.compositions["test-gending"].parts.len(), 1);
}

#[test]
fn run_settings_load_reads_a_full_settings_directory_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("font.tsv"), "i\t0x1\tDING\t1\tOPEN\t\t1.0\t0.0\no\t0x2\tDONG\t1\tOPEN\t\t1.0\t0.0\n-\t0x3\tNONE\t\tEXTENSION\t\t1.0\t0.0\n")
        .unwrap();
    std::fs::write(
        dir.path().join("valid_notes.tsv"),
        "ugal\tDING\t1\tOPEN\t1.0\t0.0\nugal\tDONG\t1\tOPEN\t1.0\t0.0\nugal\tNONE\t\tEXTENSION\t1.0\t0.0\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("tags.yaml"), "entries:\n  - spellings: ugal\n    positions: [Ugal]\n").unwrap();
    std::fs::write(dir.path().join("presets.yaml"), "- position: Ugal\n  channel: 0\n  bank: 0\n  preset: 0\n").unwrap();
    std::fs::write(dir.path().join("kempyung.yaml"), "pairs: []\n").unwrap();

    let settings = RunSettings::load(
        dir.path(),
        "test".to_string(),
        "full".to_string(),
        gamelan_notation::settings::RunOptions::default(),
    )
    .expect("a complete settings directory should load");

    let output = pipeline::run("ugal\tio\n", &settings).expect("pipeline should succeed against loaded settings");
    assert!(output.validation.remaining_invalid.is_empty());
}
