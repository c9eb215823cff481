//! # Player manifest updater
//!
//! The companion player reads a JSON manifest describing every compiled
//! composition: title, instrument group, per-part MIDI file paths, loop
//! points, marker cues, and an optional PDF path. A compiler run updates
//! only its own composition's entry, leaving every other entry in the
//! manifest untouched — read, merge, write to temp, atomic rename, per
//! spec.md §6, grounded on `original_source/src/common/playercontent_classes.py`
//! for the concrete field names.

use crate::error::GamelanError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartEntry {
    pub position: String,
    pub file: String,
    #[serde(default)]
    pub loop_start: Option<f64>,
    #[serde(default)]
    pub loop_end: Option<f64>,
    #[serde(default)]
    pub markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerManifestEntry {
    pub title: String,
    pub instrumentgroup: String,
    pub parts: Vec<PartEntry>,
    #[serde(default)]
    pub pdf: Option<String>,
    pub notation_version: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerManifest {
    #[serde(flatten)]
    pub compositions: std::collections::BTreeMap<String, PlayerManifestEntry>,
}

impl PlayerManifest {
    pub fn from_json(text: &str) -> Result<PlayerManifest, GamelanError> {
        if text.trim().is_empty() {
            return Ok(PlayerManifest::default());
        }
        serde_json::from_str(text).map_err(|e| GamelanError::Config { message: format!("malformed player manifest: {e}") })
    }

    pub fn to_json(&self) -> Result<String, GamelanError> {
        serde_json::to_string_pretty(self).map_err(|e| GamelanError::Config { message: format!("cannot serialize player manifest: {e}") })
    }
}

/// Reads the manifest at `path` (treating a missing file as an empty
/// manifest), merges `entry` under `composition_id`, and writes the
/// result back atomically.
pub fn update_manifest(
    path: impl AsRef<Path>,
    composition_id: &str,
    entry: PlayerManifestEntry,
) -> Result<(), GamelanError> {
    let path = path.as_ref();
    let existing = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(GamelanError::from(e)),
    };
    let mut manifest = PlayerManifest::from_json(&existing)?;
    manifest.compositions.insert(composition_id.to_string(), entry);
    let serialized = manifest.to_json()?;
    crate::io::atomic_write(path, serialized.as_bytes()).map_err(GamelanError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> PlayerManifestEntry {
        PlayerManifestEntry {
            title: "Gending Test".to_string(),
            instrumentgroup: "semar pagulingan".to_string(),
            parts: vec![PartEntry {
                position: "pemade_p".to_string(),
                file: "test.mid".to_string(),
                loop_start: None,
                loop_end: None,
                markers: vec![],
            }],
            pdf: None,
            notation_version: 1,
        }
    }

    #[test]
    fn update_manifest_creates_a_new_file_when_none_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        update_manifest(&path, "test", sample_entry()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let manifest = PlayerManifest::from_json(&text).unwrap();
        assert!(manifest.compositions.contains_key("test"));
    }

    #[test]
    fn update_manifest_preserves_other_compositions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        update_manifest(&path, "first", sample_entry()).unwrap();
        update_manifest(&path, "second", sample_entry()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let manifest = PlayerManifest::from_json(&text).unwrap();
        assert_eq!(manifest.compositions.len(), 2);
    }

    #[test]
    fn update_manifest_overwrites_same_composition_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut entry = sample_entry();
        update_manifest(&path, "test", entry.clone()).unwrap();
        entry.notation_version = 2;
        update_manifest(&path, "test", entry).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let manifest = PlayerManifest::from_json(&text).unwrap();
        assert_eq!(manifest.compositions["test"].notation_version, 2);
    }
}
