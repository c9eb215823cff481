//! # Metadata
//!
//! The tagged-union `MetaData` and the binder that turns a
//! [`crate::grammar::RawMetadata`] record into one of its variants.
//! Modeled as a sum type with one constructor per keyword rather than an
//! inheritance hierarchy or a trait-object base class.

use crate::error::{Diagnostics, GamelanError, Location};
use crate::grammar::RawMetadata;
use crate::position::Position;
use crate::settings::RunSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Gongan,
    Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KempliStatus {
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetaData {
    Part { name: String, scope: Scope },
    Comment { text: String, scope: Scope },
    Label { name: String, beat: Option<usize>, scope: Scope },
    Goto { label: String, from_beat: Option<usize>, passes: Vec<i32>, scope: Scope },
    Repeat { count: u32, scope: Scope },
    Sequence { labels: Vec<String>, scope: Scope },
    Tempo { value: f64, first_beat: usize, beat_count: u32, passes: Vec<i32>, scope: Scope },
    Dynamics { value: u8, positions: Vec<Position>, first_beat: usize, beat_count: u32, passes: Vec<i32>, scope: Scope },
    Kempli { status: KempliStatus, beats: Option<Vec<usize>>, scope: Scope },
    Suppress { positions: Vec<Position>, beats: Option<Vec<usize>>, passes: Option<Vec<i32>>, scope: Scope },
    Gongan { kind: crate::model::GonganType, scope: Scope },
    Octavate { position: Position, octaves: i32, scope: Scope },
    Wait { seconds: f64, after: bool, scope: Scope },
    Validation { beats: Option<Vec<usize>>, ignore: Vec<crate::model::ValidationCheck>, scope: Scope },
}

impl MetaData {
    pub fn scope(&self) -> Scope {
        match self {
            MetaData::Part { scope, .. }
            | MetaData::Comment { scope, .. }
            | MetaData::Label { scope, .. }
            | MetaData::Goto { scope, .. }
            | MetaData::Repeat { scope, .. }
            | MetaData::Sequence { scope, .. }
            | MetaData::Tempo { scope, .. }
            | MetaData::Dynamics { scope, .. }
            | MetaData::Kempli { scope, .. }
            | MetaData::Suppress { scope, .. }
            | MetaData::Gongan { scope, .. }
            | MetaData::Octavate { scope, .. }
            | MetaData::Wait { scope, .. }
            | MetaData::Validation { scope, .. } => *scope,
        }
    }

    /// Priority used to order metadata processing within a gongan: LABEL
    /// before GOTO, GONGAN before beat-scoped items, TEMPO/DYNAMICS after
    /// structural items. Lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            MetaData::Label { .. } => 0,
            MetaData::Gongan { .. } => 1,
            MetaData::Goto { .. } => 2,
            MetaData::Repeat { .. } | MetaData::Sequence { .. } => 3,
            MetaData::Kempli { .. } | MetaData::Suppress { .. } | MetaData::Octavate { .. } | MetaData::Wait { .. } | MetaData::Validation { .. } => 4,
            MetaData::Tempo { .. } | MetaData::Dynamics { .. } => 5,
            MetaData::Part { .. } | MetaData::Comment { .. } => 6,
        }
    }
}

fn scope_of(raw: &RawMetadata) -> Scope {
    match raw.params.get("scope").map(|s| s.to_uppercase()) {
        Some(ref s) if s == "SCORE" => Scope::Score,
        _ => Scope::Gongan,
    }
}

fn parse_positions(
    raw_positions: &str,
    settings: &RunSettings,
    location: &Location,
    diagnostics: &mut Diagnostics,
) -> Vec<Position> {
    let mut out = Vec::new();
    for tag in raw_positions.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match settings.tags.resolve(tag) {
            Some(positions) => out.extend(positions),
            None => diagnostics.error(GamelanError::Resolution {
                location: location.clone(),
                message: format!("unknown instrument tag {tag:?}"),
            }),
        }
    }
    out
}

fn parse_usize_list(s: &str) -> Vec<usize> {
    s.split(',').filter_map(|p| p.trim().parse().ok()).collect()
}

fn parse_i32_list(s: &str) -> Vec<i32> {
    s.split(',').filter_map(|p| p.trim().parse().ok()).collect()
}

/// Converts one raw metadata record into a typed [`MetaData`], resolving
/// `positions` fields via the tag table along the way, the same resolution
/// a stave's position tag goes through.
pub fn bind(
    raw: &RawMetadata,
    settings: &RunSettings,
    location: &Location,
    diagnostics: &mut Diagnostics,
) -> Option<MetaData> {
    let scope = scope_of(raw);
    let keyword = raw.keyword.to_uppercase();
    let get = |key: &str| raw.params.get(key).cloned();
    let default_param = raw.default_value.clone();

    Some(match keyword.as_str() {
        "PART" => MetaData::Part { name: get("name").or(default_param).unwrap_or_default(), scope },
        "COMMENT" => MetaData::Comment { text: get("text").or(default_param).unwrap_or_default(), scope },
        "LABEL" => MetaData::Label {
            name: get("name").or(default_param).unwrap_or_default(),
            beat: get("beat").and_then(|v| v.parse().ok()),
            scope,
        },
        "GOTO" => MetaData::Goto {
            label: get("label").or(default_param).unwrap_or_default(),
            from_beat: get("from_beat").and_then(|v| v.parse().ok()),
            passes: get("passes").map(|v| parse_i32_list(&v)).unwrap_or_default(),
            scope,
        },
        "REPEAT" => MetaData::Repeat {
            count: get("count").or(default_param).and_then(|v| v.parse().ok()).unwrap_or(1),
            scope,
        },
        "SEQUENCE" => MetaData::Sequence {
            labels: get("value").or(default_param).map(|v| parse_list(&v)).unwrap_or_default(),
            scope,
        },
        "TEMPO" => MetaData::Tempo {
            value: get("value").or(default_param).and_then(|v| v.parse().ok()).unwrap_or(0.0),
            first_beat: get("first_beat").and_then(|v| v.parse().ok()).unwrap_or(1),
            beat_count: get("beat_count").and_then(|v| v.parse().ok()).unwrap_or(0),
            passes: get("passes").map(|v| parse_i32_list(&v)).unwrap_or_default(),
            scope,
        },
        "DYNAMICS" => MetaData::Dynamics {
            value: get("value").or(default_param).and_then(|v| v.parse().ok()).unwrap_or(0),
            positions: get("positions").map(|v| parse_positions(&v, settings, location, diagnostics)).unwrap_or_default(),
            first_beat: get("first_beat").and_then(|v| v.parse().ok()).unwrap_or(1),
            beat_count: get("beat_count").and_then(|v| v.parse().ok()).unwrap_or(0),
            passes: get("passes").map(|v| parse_i32_list(&v)).unwrap_or_default(),
            scope,
        },
        "KEMPLI" => MetaData::Kempli {
            status: match get("status").or(default_param).map(|v| v.to_uppercase()).as_deref() {
                Some("OFF") => KempliStatus::Off,
                _ => KempliStatus::On,
            },
            beats: get("beats").map(|v| parse_usize_list(&v)),
            scope,
        },
        "SUPPRESS" => MetaData::Suppress {
            positions: get("positions").map(|v| parse_positions(&v, settings, location, diagnostics)).unwrap_or_default(),
            beats: get("beats").map(|v| parse_usize_list(&v)),
            passes: get("passes").map(|v| parse_i32_list(&v)),
            scope,
        },
        "GONGAN" => MetaData::Gongan {
            kind: match get("type").or(default_param).map(|v| v.to_uppercase()).as_deref() {
                Some("KEBYAR") => crate::model::GonganType::Kebyar,
                Some("GINEMAN") => crate::model::GonganType::Gineman,
                _ => crate::model::GonganType::Regular,
            },
            scope,
        },
        "OCTAVATE" => MetaData::Octavate {
            position: get("position").and_then(|v| settings.tags.resolve(&v)).and_then(|p| p.first().copied()).unwrap_or(Position::Ugal),
            octaves: get("octaves").or(default_param).and_then(|v| v.parse().ok()).unwrap_or(0),
            scope,
        },
        "WAIT" => MetaData::Wait {
            seconds: get("seconds").or(default_param).and_then(|v| v.parse().ok()).unwrap_or(0.0),
            after: get("after").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false),
            scope,
        },
        "VALIDATION" => MetaData::Validation {
            beats: get("beats").map(|v| parse_usize_list(&v)),
            ignore: get("ignore").or(default_param).map(|v| parse_list(&v)).unwrap_or_default().iter().filter_map(|name| parse_check_name(name)).collect(),
            scope,
        },
        other => {
            diagnostics.error(GamelanError::Grammar {
                location: location.clone(),
                message: format!("unknown metadata keyword {other:?}"),
            });
            return None;
        }
    })
}

fn parse_list(s: &str) -> Vec<String> {
    s.trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|p| p.trim().trim_matches('"').to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_check_name(name: &str) -> Option<crate::model::ValidationCheck> {
    use crate::model::ValidationCheck::*;
    Some(match name.to_uppercase().as_str() {
        "BEAT_LENGTH" => BeatLength,
        "EQUAL_MEASURE_LENGTH" => EqualMeasureLength,
        "IN_RANGE" => InRange,
        "KEMPYUNG" => Kempyung,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdMap;

    fn raw(keyword: &str, default_value: Option<&str>, params: &[(&str, &str)]) -> RawMetadata {
        let mut map = StdMap::new();
        for (k, v) in params {
            map.insert(k.to_string(), v.to_string());
        }
        RawMetadata {
            keyword: keyword.to_string(),
            default_value: default_value.map(str::to_string),
            params: map,
            line: 1,
        }
    }

    #[test]
    fn tempo_binds_default_param_as_value() {
        let settings = RunSettings::minimal_for_tests();
        let mut diags = Diagnostics::new();
        let result = bind(&raw("TEMPO", Some("60"), &[]), &settings, &Location::default(), &mut diags).unwrap();
        assert!(matches!(result, MetaData::Tempo { value, .. } if value == 60.0));
    }

    #[test]
    fn goto_priority_is_after_label() {
        let settings = RunSettings::minimal_for_tests();
        let mut diags = Diagnostics::new();
        let label = bind(&raw("LABEL", Some("A"), &[]), &settings, &Location::default(), &mut diags).unwrap();
        let goto = bind(&raw("GOTO", Some("A"), &[]), &settings, &Location::default(), &mut diags).unwrap();
        assert!(label.priority() < goto.priority());
    }

    #[test]
    fn unknown_keyword_reports_grammar_error() {
        let settings = RunSettings::minimal_for_tests();
        let mut diags = Diagnostics::new();
        let result = bind(&raw("BOGUS", None, &[]), &settings, &Location::default(), &mut diags);
        assert!(result.is_none());
        assert!(diags.has_errors());
    }
}
