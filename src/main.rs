use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use gamelan_notation::manifest::{PartEntry, PlayerManifestEntry};
use gamelan_notation::settings::{RunOptions, RunSettings};
use gamelan_notation::{manifest, pipeline};

/// Compiles tab-separated Balinese gamelan notation to a Standard MIDI
/// file, optionally writing back a corrected notation file and updating
/// a player manifest.
#[derive(Parser, Debug)]
#[command(name = "notation2midi", version, about)]
struct Cli {
    /// Notation source file (tab-separated text).
    notation: PathBuf,

    /// Directory containing font.tsv, valid_notes.tsv, tags.yaml,
    /// presets.yaml, kempyung.yaml, and an optional timing.yaml.
    #[arg(long)]
    settings_dir: PathBuf,

    /// Composition identifier, used as the player manifest's key.
    #[arg(long)]
    composition_id: String,

    /// Part identifier within the composition (e.g. "full", "gangsa").
    #[arg(long, default_value = "full")]
    part_id: String,

    /// Where to write the MIDI output.
    #[arg(long, default_value = "out.mid")]
    midi_out: PathBuf,

    /// Where to write the corrected notation text, when --save-corrected.
    #[arg(long, default_value = "out.corrected.txt")]
    corrected_out: PathBuf,

    /// Player manifest JSON to read-merge-write, when --update-manifest.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Title recorded in the player manifest entry.
    #[arg(long, default_value = "")]
    title: String,

    /// Instrument group recorded in the player manifest entry.
    #[arg(long, default_value = "")]
    instrumentgroup: String,

    #[arg(long)]
    autocorrect: bool,
    #[arg(long)]
    detailed_validation_logging: bool,
    #[arg(long)]
    save_corrected: bool,
    #[arg(long)]
    save_midifile: bool,
    #[arg(long)]
    update_manifest: bool,
    #[arg(long)]
    is_production_run: bool,
    #[arg(long)]
    is_integration_test: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let options = RunOptions {
        autocorrect: cli.autocorrect,
        detailed_validation_logging: cli.detailed_validation_logging,
        save_corrected: cli.save_corrected,
        save_pdf: false,
        save_midifile: cli.save_midifile,
        is_production_run: cli.is_production_run,
        is_integration_test: cli.is_integration_test,
    };

    let settings = match RunSettings::load(&cli.settings_dir, cli.composition_id.clone(), cli.part_id.clone(), options) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("failed to load settings from {:?}: {e}", cli.settings_dir);
            process::exit(1);
        }
    };

    let source = match fs::read_to_string(&cli.notation) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("failed to read {:?}: {e}", cli.notation);
            process::exit(1);
        }
    };

    let output = match pipeline::run(&source, &settings) {
        Ok(output) => output,
        Err(diagnostics) => {
            eprintln!("{}", pipeline::summarize(&diagnostics));
            process::exit(1);
        }
    };

    if let Some(midi) = &output.midi {
        if let Err(e) = midi.write(&cli.midi_out) {
            eprintln!("failed to write {:?}: {e}", cli.midi_out);
            process::exit(1);
        }
        eprintln!("wrote MIDI to {:?}", cli.midi_out);
    }

    if let Some(corrected) = &output.corrected_notation {
        if let Err(e) = fs::write(&cli.corrected_out, corrected) {
            eprintln!("failed to write {:?}: {e}", cli.corrected_out);
            process::exit(1);
        }
        eprintln!("wrote corrected notation to {:?}", cli.corrected_out);
    }

    if cli.update_manifest {
        let Some(manifest_path) = &cli.manifest else {
            eprintln!("--update-manifest requires --manifest <path>");
            process::exit(1);
        };
        let parts = output
            .score
            .active_positions
            .iter()
            .map(|position| PartEntry {
                position: position.short_code().to_string(),
                file: cli.midi_out.display().to_string(),
                loop_start: None,
                loop_end: None,
                markers: Vec::new(),
            })
            .collect();
        let entry = PlayerManifestEntry {
            title: cli.title.clone(),
            instrumentgroup: cli.instrumentgroup.clone(),
            parts,
            pdf: None,
            notation_version: 1,
        };
        if let Err(e) = manifest::update_manifest(manifest_path, &cli.composition_id, entry) {
            eprintln!("failed to update player manifest {manifest_path:?}: {e}");
            process::exit(1);
        }
        eprintln!("updated player manifest {manifest_path:?}");
    }

    if !output.validation.remaining_invalid.is_empty() {
        eprintln!("{} finding(s) remain invalid after validation", output.validation.remaining_invalid.len());
        process::exit(1);
    }
}
