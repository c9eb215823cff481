//! # Run Settings
//!
//! Configuration loading from YAML/TSV lives outside the compiler's core
//! concerns; this module defines the *interfaces the core consumes* —
//! [`RunSettings`] and its nested lookup tables — plus a small loader for
//! them, since the pipeline needs a concrete settings value to run at all.
//! The loader uses `serde_yaml` for the YAML-shaped tables (tag table,
//! rule table, preset table) and a hand-rolled TSV reader for the
//! font/valid-note table, since no generic TSV crate exists in this pack.
//!
//! All tables are populated once at startup and treated as immutable
//! thereafter. They are passed as an explicit `&RunSettings` parameter
//! through every stage rather than a hidden singleton, so tests can
//! inject alternative configurations.

use crate::error::GamelanError;
use crate::note::ValidNoteEntry;
use crate::position::Position;
use crate::tone::{Pitch, Stroke};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Which co-occurrence rule a pair/group of positions should use when one
/// notates a stave and the others derive theirs from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RuleKind {
    SameTone,
    SamePitch,
    SamePitchExtendedRange,
    ExactKempyung,
    Kempyung,
}

/// One font-table record: a recognized notation character
/// mapped to the tone/stroke/duration it denotes for a plain (unmodified)
/// symbol. Modifier characters are resolved separately by
/// [`FontTable::modifier`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontEntry {
    pub pitch: Pitch,
    pub octave: Option<i8>,
    pub stroke: Stroke,
    pub duration: f64,
    pub rest_after: f64,
}

/// How a single modifier character changes a base symbol's
/// octave/stroke/duration. Sorted into canonical order by the builder
/// before lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modifier {
    OctaveUp,
    OctaveDown,
    Abbreviated,
    Muted,
    Half,
    Quarter,
    Tremolo,
    TremoloAccelerating,
    GraceBefore(Pitch),
}

/// Maps recognized notation characters to their base tone/stroke and their
/// modifier meaning, consumed read-only by [`crate::builder::ScoreBuilder`].
#[derive(Debug, Clone, Default)]
pub struct FontTable {
    pub base_symbols: HashMap<char, FontEntry>,
    pub modifiers: HashMap<char, Modifier>,
}

impl FontTable {
    /// The canonical modifier ordering the builder sorts a symbol's
    /// modifier chain into before lookup: octave, then abbreviation,
    /// then mute/duration shorteners, then tremolo.
    pub fn canonical_modifier_order(c: char) -> u8 {
        match c {
            ',' | '<' => 0,
            '/' => 1,
            '?' => 2,
            '_' => 3,
            '=' => 4,
            ';' | ':' => 5,
            _ => 9,
        }
    }

    /// Parses a TSV font table: `symbol\tcodepoint\tpitch\toctave\tstroke\tmodifier\tduration\trest_after`.
    /// Lines starting with `#` and blank lines are skipped.
    pub fn from_tsv(tsv: &str) -> Result<FontTable, crate::error::GamelanError> {
        let mut table = FontTable::default();
        for (lineno, line) in tsv.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 8 {
                return Err(crate::error::GamelanError::Config {
                    message: format!("font table line {}: expected 8 columns, got {}", lineno + 1, cols.len()),
                });
            }
            let symbol = cols[0].chars().next().ok_or_else(|| crate::error::GamelanError::Config {
                message: format!("font table line {}: empty symbol", lineno + 1),
            })?;
            let pitch = parse_pitch(cols[2]).ok_or_else(|| crate::error::GamelanError::Config {
                message: format!("font table line {}: unknown pitch {:?}", lineno + 1, cols[2]),
            })?;
            let octave = if cols[3].is_empty() { None } else { cols[3].parse::<i8>().ok() };
            let stroke = parse_stroke(cols[4]).ok_or_else(|| crate::error::GamelanError::Config {
                message: format!("font table line {}: unknown stroke {:?}", lineno + 1, cols[4]),
            })?;
            let duration: f64 = cols[6].parse().unwrap_or(1.0);
            let rest_after: f64 = cols[7].parse().unwrap_or(0.0);
            if table
                .base_symbols
                .insert(symbol, FontEntry { pitch, octave, stroke, duration, rest_after })
                .is_some()
            {
                return Err(crate::error::GamelanError::Config {
                    message: format!("duplicate symbol {symbol:?} in font table (line {})", lineno + 1),
                });
            }
        }
        Ok(table)
    }
}

fn parse_pitch(s: &str) -> Option<Pitch> {
    Some(match s.to_uppercase().as_str() {
        "DING" => Pitch::Ding,
        "DONG" => Pitch::Dong,
        "DENG" => Pitch::Deng,
        "DEUNG" => Pitch::Deung,
        "DUNG" => Pitch::Dung,
        "DANG" => Pitch::Dang,
        "DAING" => Pitch::Daing,
        "DENGDING" => Pitch::DengDing,
        "STRIKE" => Pitch::Strike,
        "BYONG" => Pitch::Byong,
        "TONG" => Pitch::Tong,
        "PAK" => Pitch::Pak,
        "DAG" => Pitch::Dag,
        "DUG" => Pitch::Dug,
        "GIR" => Pitch::Gir,
        "JET" => Pitch::Jet,
        "PEK" => Pitch::Pek,
        "PUR" => Pitch::Pur,
        "KA" => Pitch::Ka,
        "CUNG" => Pitch::Cung,
        "KUNG" => Pitch::Kung,
        "PLAK" => Pitch::Plak,
        "TUT" => Pitch::Tut,
        "MUTED" => Pitch::Muted,
        "OPEN" => Pitch::Open,
        "NONE" | "" => Pitch::None,
        _ => return None,
    })
}

fn parse_stroke(s: &str) -> Option<Stroke> {
    Some(match s.to_uppercase().as_str() {
        "OPEN" => Stroke::Open,
        "MUTED" => Stroke::Muted,
        "ABBREVIATED" => Stroke::Abbreviated,
        "TREMOLO" => Stroke::Tremolo,
        "TREMOLO_ACCELERATING" => Stroke::TremoloAccelerating,
        "GRACE_NOTE" => Stroke::GraceNote,
        "NOROT" => Stroke::Norot,
        "TICK1" => Stroke::Tick1,
        "TICK2" => Stroke::Tick2,
        "KAPAK" => Stroke::Kapak,
        "DETUT" => Stroke::Detut,
        "CUNGKUNG" => Stroke::Cungkung,
        "EXTENSION" => Stroke::Extension,
        "SILENCE" => Stroke::Silence,
        "NONE" | "" => Stroke::None,
        _ => return None,
    })
}

/// Maps each [`Position`] to its valid-note table: the derived set of
/// allowable tone/stroke/duration tuples it may produce.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidNoteTable {
    #[serde(skip)]
    by_position: HashMap<String, Vec<ValidNoteEntry>>,
}

impl ValidNoteTable {
    pub fn insert(&mut self, position: Position, entries: Vec<ValidNoteEntry>) {
        self.by_position.insert(position.short_code().to_string(), entries);
    }

    pub fn get(&self, position: Position) -> &[ValidNoteEntry] {
        self.by_position
            .get(position.short_code())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Parses a TSV valid-note table: `position\tpitch\toctave\tstroke\tduration\trest_after`.
    /// Lines starting with `#` and blank lines are skipped. This is the
    /// derived set spec.md §6 describes as an external loader's
    /// responsibility; here it is read directly rather than recomputed
    /// from a font table, since the derivation rule itself is config, not
    /// core logic.
    pub fn from_tsv(tsv: &str) -> Result<ValidNoteTable, GamelanError> {
        let mut table = ValidNoteTable::default();
        for (lineno, line) in tsv.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 6 {
                return Err(GamelanError::Config {
                    message: format!("valid-note table line {}: expected 6 columns, got {}", lineno + 1, cols.len()),
                });
            }
            let position = parse_position_code(cols[0]).ok_or_else(|| GamelanError::Config {
                message: format!("valid-note table line {}: unknown position {:?}", lineno + 1, cols[0]),
            })?;
            let pitch = parse_pitch(cols[1]).ok_or_else(|| GamelanError::Config {
                message: format!("valid-note table line {}: unknown pitch {:?}", lineno + 1, cols[1]),
            })?;
            let octave = if cols[2].is_empty() { None } else { cols[2].parse::<i8>().ok() };
            let stroke = parse_stroke(cols[3]).ok_or_else(|| GamelanError::Config {
                message: format!("valid-note table line {}: unknown stroke {:?}", lineno + 1, cols[3]),
            })?;
            let duration: f64 = cols[4].parse().unwrap_or(1.0);
            let rest_after: f64 = cols[5].parse().unwrap_or(0.0);
            table
                .by_position
                .entry(position.short_code().to_string())
                .or_default()
                .push(ValidNoteEntry { pitch, octave, stroke, duration, rest_after });
        }
        Ok(table)
    }
}

fn parse_position_code(code: &str) -> Option<Position> {
    Position::ALL.iter().copied().find(|p| p.short_code().eq_ignore_ascii_case(code))
}

/// One instrument tag's alternative spellings and the positions it
/// resolves to, optionally gated on an instrument group.
#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    /// Pipe-separated alternative spellings, e.g. `"gangsa|gangsas"`.
    pub spellings: String,
    /// Pipe-separated suffix additions combined with separators
    /// `{"", " ", "_"}`, e.g. `"polos|sangsih"`.
    #[serde(default)]
    pub suffixes: Option<String>,
    pub positions: Vec<Position>,
    #[serde(default)]
    pub group: Option<String>,
}

/// Maps tag strings (after alternative-spelling and suffix expansion) to
/// the set of positions they denote.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagTable {
    pub entries: Vec<TagEntry>,
}

impl TagTable {
    /// Resolves a raw tag string (e.g. `"gangsa polos"`) to the set of
    /// positions it names, trying each entry's expanded spelling×suffix
    /// combinations.
    pub fn resolve(&self, tag: &str) -> Option<Vec<Position>> {
        // Tags in notation source are commonly written with underscores
        // (`pemade_polos`) while the table's own spellings read more
        // naturally with spaces (`pemade polos`); normalize both sides so
        // either convention matches the same entry.
        let tag_norm = tag.trim().to_lowercase().replace('_', " ");
        for entry in &self.entries {
            for spelling in entry.spellings.split('|') {
                let spelling = spelling.trim().to_lowercase().replace('_', " ");
                if spelling == tag_norm {
                    return Some(entry.positions.clone());
                }
                if let Some(suffixes) = &entry.suffixes {
                    for suffix in suffixes.split('|') {
                        let suffix = suffix.trim();
                        for sep in ["", " ", "_"] {
                            let candidate = format!("{spelling}{sep}{suffix}").to_lowercase().replace('_', " ");
                            if candidate == tag_norm {
                                return Some(entry.positions.clone());
                            }
                        }
                    }
                }
            }
        }
        None
    }
}

/// MIDI channel/bank/preset assignment for a position.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PresetEntry {
    pub channel: u8,
    pub bank: u8,
    pub preset: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresetTable {
    #[serde(skip)]
    by_position: HashMap<String, PresetEntry>,
}

impl PresetTable {
    pub fn insert(&mut self, position: Position, entry: PresetEntry) {
        self.by_position.insert(position.short_code().to_string(), entry);
    }

    pub fn get(&self, position: Position) -> Option<PresetEntry> {
        self.by_position.get(position.short_code()).copied()
    }

    /// Loads a YAML list of `{position, channel, bank, preset}` records.
    pub fn from_yaml(yaml: &str) -> Result<PresetTable, GamelanError> {
        #[derive(Deserialize)]
        struct Row {
            position: Position,
            channel: u8,
            bank: u8,
            preset: u8,
        }
        let rows: Vec<Row> = serde_yaml::from_str(yaml).map_err(|e| GamelanError::Config { message: format!("preset table: {e}") })?;
        let mut table = PresetTable::default();
        for row in rows {
            table.insert(row.position, PresetEntry { channel: row.channel, bank: row.bank, preset: row.preset });
        }
        Ok(table)
    }
}

/// Options controlling one compiler run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunOptions {
    pub autocorrect: bool,
    pub detailed_validation_logging: bool,
    pub save_corrected: bool,
    pub save_pdf: bool,
    pub save_midifile: bool,
    pub is_production_run: bool,
    pub is_integration_test: bool,
}

/// Timing and expansion constants consumed by the ScoreBuilder and
/// MidiEmitter.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingSettings {
    pub ppq: u16,
    pub base_note_time: u32,
    pub tremolo_notes_per_quarter: f64,
    pub accelerating_pattern: Vec<f64>,
    pub accelerating_velocity: Vec<u8>,
    pub grace_note_duration: f64,
    pub grace_note_threshold: f64,
    pub silence_seconds_after_end: f64,
    pub silence_seconds_after_music_end: f64,
    pub beat_at_end: bool,
    pub max_pass_limit: u32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            ppq: 480,
            base_note_time: 480,
            tremolo_notes_per_quarter: 4.0,
            accelerating_pattern: vec![0.5, 0.25, 0.125, 0.125],
            accelerating_velocity: vec![100, 90, 80, 100],
            grace_note_duration: 0.125,
            grace_note_threshold: 0.25,
            silence_seconds_after_end: 2.0,
            silence_seconds_after_music_end: 0.0,
            beat_at_end: false,
            max_pass_limit: 1000,
        }
    }
}

/// Which (polos, sangsih) position pairs are checked for the kempyung
/// invariant and used by the rule engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KempyungPairs {
    pub pairs: Vec<(Position, Position)>,
}

/// Files a settings directory is expected to provide, read by
/// [`RunSettings::load`].
const FONT_FILE: &str = "font.tsv";
const VALID_NOTES_FILE: &str = "valid_notes.tsv";
const TAGS_FILE: &str = "tags.yaml";
const PRESETS_FILE: &str = "presets.yaml";
const KEMPYUNG_FILE: &str = "kempyung.yaml";
const TIMING_FILE: &str = "timing.yaml";

/// The complete settings snapshot threaded through every pipeline stage.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub composition_id: String,
    pub part_id: String,
    pub options: RunOptions,
    pub timing: TimingSettings,
    pub font: FontTable,
    pub valid_notes: ValidNoteTable,
    pub tags: TagTable,
    pub presets: PresetTable,
    pub kempyung_pairs: KempyungPairs,
    pub shorthand_positions: Vec<Position>,
}

impl RunSettings {
    /// Minimal settings usable in tests and small examples, with an
    /// identity-ish font/valid-note table for the positions exercised by
    /// the concrete scenarios in .
    pub fn minimal_for_tests() -> RunSettings {
        crate::settings::test_fixtures::minimal()
    }

    /// Loads a settings snapshot from a directory of YAML/TSV files:
    /// `font.tsv`, `valid_notes.tsv` (TSV, hand-rolled reader), `tags.yaml`,
    /// `presets.yaml`, `kempyung.yaml` (YAML, `serde_yaml`). `timing.yaml`
    /// is optional; its absence falls back to [`TimingSettings::default`].
    /// This is the minimal loader spec.md §1 treats as an external
    /// collaborator's job — it defines the interface the core consumes,
    /// not a general-purpose settings management system.
    pub fn load(
        dir: impl AsRef<Path>,
        composition_id: String,
        part_id: String,
        options: RunOptions,
    ) -> Result<RunSettings, GamelanError> {
        let dir = dir.as_ref();
        let read = |name: &str| -> Result<String, GamelanError> {
            std::fs::read_to_string(dir.join(name)).map_err(|e| GamelanError::Config {
                message: format!("cannot read {}: {e}", dir.join(name).display()),
            })
        };

        let font = FontTable::from_tsv(&read(FONT_FILE)?)?;
        let valid_notes = ValidNoteTable::from_tsv(&read(VALID_NOTES_FILE)?)?;
        let tags: TagTable = serde_yaml::from_str(&read(TAGS_FILE)?)
            .map_err(|e| GamelanError::Config { message: format!("tag table: {e}") })?;
        let presets = PresetTable::from_yaml(&read(PRESETS_FILE)?)?;
        let kempyung_pairs: KempyungPairs = serde_yaml::from_str(&read(KEMPYUNG_FILE)?)
            .map_err(|e| GamelanError::Config { message: format!("kempyung pairs: {e}") })?;
        let timing = match std::fs::read_to_string(dir.join(TIMING_FILE)) {
            Ok(text) => serde_yaml::from_str(&text).map_err(|e| GamelanError::Config { message: format!("timing settings: {e}") })?,
            Err(_) => TimingSettings::default(),
        };

        Ok(RunSettings {
            composition_id,
            part_id,
            options,
            timing,
            font,
            valid_notes,
            tags,
            presets,
            kempyung_pairs,
            shorthand_positions: Position::default_shorthand_positions().to_vec(),
        })
    }
}

/// Test-only fixture builders, kept in the library (not `#[cfg(test)]`) so
/// integration tests in `tests/` can also construct a `RunSettings`
/// without re-deriving the whole table by hand.
pub mod test_fixtures {
    use super::*;
    use crate::note::ValidNoteEntry;

    fn entry(pitch: Pitch, octave: Option<i8>, stroke: Stroke, duration: f64, rest_after: f64) -> ValidNoteEntry {
        ValidNoteEntry { pitch, octave, stroke, duration, rest_after }
    }

    /// Four melodic tones at octave 1, open stroke, duration 1, for the
    /// positions used by scenarios, plus a muted kempli
    /// strike and the EXTENSION/SILENCE filler rows every position needs.
    pub fn minimal() -> RunSettings {
        let melodic_positions = [
            Position::Ugal,
            Position::PemadePolos,
            Position::PemadeSangsih,
            Position::KantilanPolos,
            Position::KantilanSangsih,
            Position::Calung,
            Position::Jegogan,
            Position::Penyacah,
            Position::Reyong1,
            Position::Reyong2,
            Position::Reyong3,
            Position::Reyong4,
        ];
        let pitches = [Pitch::Ding, Pitch::Dong, Pitch::Deng, Pitch::Deung, Pitch::Dung, Pitch::Dang, Pitch::Daing];

        let mut valid_notes = ValidNoteTable::default();
        for &position in &melodic_positions {
            let mut entries = Vec::new();
            for octave in 0..=2 {
                for &pitch in &pitches {
                    for duration in [0.25, 0.5, 1.0, 2.0, 4.0] {
                        entries.push(entry(pitch, Some(octave), Stroke::Open, duration, 0.0));
                        entries.push(entry(pitch, Some(octave), Stroke::Muted, duration, 0.0));
                        entries.push(entry(pitch, Some(octave), Stroke::GraceNote, duration, 0.0));
                    }
                }
            }
            entries.push(entry(Pitch::None, None, Stroke::Extension, 1.0, 0.0));
            entries.push(entry(Pitch::None, None, Stroke::Extension, 2.0, 0.0));
            entries.push(entry(Pitch::None, None, Stroke::Extension, 3.0, 0.0));
            entries.push(entry(Pitch::None, None, Stroke::Extension, 4.0, 0.0));
            entries.push(entry(Pitch::None, None, Stroke::Silence, 1.0, 0.0));
            entries.push(entry(Pitch::None, None, Stroke::Silence, 2.0, 0.0));
            entries.push(entry(Pitch::None, None, Stroke::Silence, 3.0, 0.0));
            entries.push(entry(Pitch::None, None, Stroke::Silence, 4.0, 0.0));
            valid_notes.insert(position, entries);
        }

        let mut kempli_entries = vec![
            entry(Pitch::Strike, None, Stroke::Muted, 1.0, 0.0),
            entry(Pitch::None, None, Stroke::Extension, 1.0, 0.0),
            entry(Pitch::None, None, Stroke::Extension, 2.0, 0.0),
            entry(Pitch::None, None, Stroke::Extension, 3.0, 0.0),
            entry(Pitch::None, None, Stroke::Silence, 1.0, 0.0),
        ];
        kempli_entries.dedup();
        valid_notes.insert(Position::Kempli, kempli_entries);

        let mut font = FontTable::default();
        font.base_symbols.insert('i', FontEntry { pitch: Pitch::Ding, octave: Some(1), stroke: Stroke::Open, duration: 1.0, rest_after: 0.0 });
        font.base_symbols.insert('o', FontEntry { pitch: Pitch::Dong, octave: Some(1), stroke: Stroke::Open, duration: 1.0, rest_after: 0.0 });
        font.base_symbols.insert('e', FontEntry { pitch: Pitch::Deng, octave: Some(1), stroke: Stroke::Open, duration: 1.0, rest_after: 0.0 });
        font.base_symbols.insert('u', FontEntry { pitch: Pitch::Dung, octave: Some(1), stroke: Stroke::Open, duration: 1.0, rest_after: 0.0 });
        font.base_symbols.insert('a', FontEntry { pitch: Pitch::Dang, octave: Some(1), stroke: Stroke::Open, duration: 1.0, rest_after: 0.0 });
        font.base_symbols.insert('-', FontEntry { pitch: Pitch::None, octave: None, stroke: Stroke::Extension, duration: 1.0, rest_after: 0.0 });
        font.base_symbols.insert('.', FontEntry { pitch: Pitch::None, octave: None, stroke: Stroke::Silence, duration: 1.0, rest_after: 0.0 });
        font.modifiers.insert(',', Modifier::OctaveDown);
        font.modifiers.insert('<', Modifier::OctaveUp);
        font.modifiers.insert('/', Modifier::Abbreviated);
        font.modifiers.insert('?', Modifier::Muted);
        font.modifiers.insert('_', Modifier::Half);
        font.modifiers.insert('=', Modifier::Quarter);
        font.modifiers.insert(';', Modifier::Tremolo);
        font.modifiers.insert(':', Modifier::TremoloAccelerating);

        let mut tags = TagTable::default();
        tags.entries.push(TagEntry {
            spellings: "ugal".to_string(),
            suffixes: None,
            positions: vec![Position::Ugal],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "gangsa".to_string(),
            suffixes: None,
            positions: vec![Position::PemadePolos, Position::PemadeSangsih, Position::KantilanPolos, Position::KantilanSangsih],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "pemade polos".to_string(),
            suffixes: None,
            positions: vec![Position::PemadePolos],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "pemade sangsih".to_string(),
            suffixes: None,
            positions: vec![Position::PemadeSangsih],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "kantilan polos".to_string(),
            suffixes: None,
            positions: vec![Position::KantilanPolos],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "kantilan sangsih".to_string(),
            suffixes: None,
            positions: vec![Position::KantilanSangsih],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "calung".to_string(),
            suffixes: None,
            positions: vec![Position::Calung],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "jegogan".to_string(),
            suffixes: None,
            positions: vec![Position::Jegogan],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "penyacah".to_string(),
            suffixes: None,
            positions: vec![Position::Penyacah],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "reyong1".to_string(),
            suffixes: None,
            positions: vec![Position::Reyong1],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "reyong2".to_string(),
            suffixes: None,
            positions: vec![Position::Reyong2],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "reyong3".to_string(),
            suffixes: None,
            positions: vec![Position::Reyong3],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "reyong4".to_string(),
            suffixes: None,
            positions: vec![Position::Reyong4],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "kempli".to_string(),
            suffixes: None,
            positions: vec![Position::Kempli],
            group: None,
        });
        tags.entries.push(TagEntry {
            spellings: "gongs".to_string(),
            suffixes: None,
            positions: vec![Position::Gongs],
            group: None,
        });

        let mut presets = PresetTable::default();
        for (i, &position) in Position::ALL.iter().enumerate() {
            presets.insert(position, PresetEntry { channel: i as u8 % 16, bank: 0, preset: 0 });
        }

        RunSettings {
            composition_id: "test".to_string(),
            part_id: "full".to_string(),
            options: RunOptions::default(),
            timing: TimingSettings::default(),
            font,
            valid_notes,
            tags,
            presets,
            kempyung_pairs: KempyungPairs {
                pairs: vec![
                    (Position::PemadePolos, Position::PemadeSangsih),
                    (Position::KantilanPolos, Position::KantilanSangsih),
                ],
            },
            shorthand_positions: Position::default_shorthand_positions().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_table_resolves_plain_spelling() {
        let settings = RunSettings::minimal_for_tests();
        assert_eq!(settings.tags.resolve("kempli"), Some(vec![Position::Kempli]));
    }

    #[test]
    fn tag_table_resolves_exact_suffixed_entry() {
        let settings = RunSettings::minimal_for_tests();
        assert_eq!(
            settings.tags.resolve("pemade polos"),
            Some(vec![Position::PemadePolos])
        );
    }

    #[test]
    fn unresolved_tag_returns_none() {
        let settings = RunSettings::minimal_for_tests();
        assert_eq!(settings.tags.resolve("nonexistent"), None);
    }

    #[test]
    fn font_table_from_tsv_parses_rows() {
        let tsv = "i\t0x1\tDING\t1\tOPEN\t\t1.0\t0.0\n";
        let table = FontTable::from_tsv(tsv).unwrap();
        let entry = table.base_symbols.get(&'i').unwrap();
        assert_eq!(entry.pitch, Pitch::Ding);
        assert_eq!(entry.octave, Some(1));
    }

    #[test]
    fn font_table_from_tsv_rejects_duplicate_symbol() {
        let tsv = "i\t0x1\tDING\t1\tOPEN\t\t1.0\t0.0\ni\t0x2\tDONG\t1\tOPEN\t\t1.0\t0.0\n";
        assert!(FontTable::from_tsv(tsv).is_err());
    }

    #[test]
    fn valid_note_table_from_tsv_parses_rows() {
        let tsv = "kempli\tSTRIKE\t\tMUTED\t1.0\t0.0\n";
        let table = ValidNoteTable::from_tsv(tsv).unwrap();
        let entries = table.get(Position::Kempli);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pitch, Pitch::Strike);
        assert_eq!(entries[0].stroke, Stroke::Muted);
    }

    #[test]
    fn run_settings_load_reads_a_directory_of_tables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("font.tsv"), "i\t0x1\tDING\t1\tOPEN\t\t1.0\t0.0\n").unwrap();
        std::fs::write(dir.path().join("valid_notes.tsv"), "ugal\tDING\t1\tOPEN\t1.0\t0.0\n").unwrap();
        std::fs::write(dir.path().join("tags.yaml"), "entries:\n  - spellings: ugal\n    positions: [Ugal]\n").unwrap();
        std::fs::write(dir.path().join("presets.yaml"), "- position: Ugal\n  channel: 0\n  bank: 0\n  preset: 0\n").unwrap();
        std::fs::write(dir.path().join("kempyung.yaml"), "pairs: []\n").unwrap();

        let settings = RunSettings::load(dir.path(), "test".to_string(), "full".to_string(), RunOptions::default()).unwrap();
        assert_eq!(settings.tags.resolve("ugal"), Some(vec![Position::Ugal]));
        assert_eq!(settings.presets.get(Position::Ugal).unwrap().channel, 0);
        assert_eq!(settings.valid_notes.get(Position::Ugal).len(), 1);
    }
}
