//! # TagResolver (Stage B, part 1)
//!
//! Expands a stave's instrument tag into the concrete [`Position`]s it
//! denotes, duplicating the stave's measures per resulting position.
//! Pass-range splitting (`N-M` → `{N, ..., M}`) already happened in
//! [`crate::grammar::parser::parse_position_field`]; this stage only
//! resolves the tag string itself, via the externally supplied
//! instrument-tag table, which is config rather than hard-coded.

use crate::error::{Diagnostics, GamelanError, Location};
use crate::grammar::RawStave;
use crate::position::Position;
use crate::settings::RunSettings;

/// One stave after tag resolution: exactly one concrete position, its
/// measures (shared by clone from the raw stave, since several positions
/// may share one notated line, e.g. unison gangsa staves). `group` ties
/// together every `ResolvedStave` that came from the same raw stave line,
/// so the builder knows which positions share one notation and may need
/// rule-based derivation rather than a literal copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStave {
    pub position: Position,
    pub passes: Option<Vec<i32>>,
    pub measures: Vec<Vec<String>>,
    pub line: usize,
    pub group: usize,
}

/// Resolves every stave in a gongan's raw stave list, reporting an
/// unresolved tag together with its stave's line number.
pub fn resolve_staves(
    staves: &[RawStave],
    gongan_id: usize,
    settings: &RunSettings,
    diagnostics: &mut Diagnostics,
) -> Vec<ResolvedStave> {
    let mut resolved = Vec::new();
    for (group, stave) in staves.iter().enumerate() {
        match settings.tags.resolve(&stave.position_tag) {
            Some(positions) => {
                for position in positions {
                    resolved.push(ResolvedStave {
                        position,
                        passes: stave.passes.clone(),
                        measures: stave.measures.clone(),
                        line: stave.line,
                        group,
                    });
                }
            }
            None => diagnostics.error(GamelanError::Resolution {
                location: Location {
                    gongan: Some(gongan_id),
                    beat: None,
                    position: None,
                    line: Some(stave.line),
                },
                message: format!("unknown instrument tag {:?}", stave.position_tag),
            }),
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tag_resolves_to_one_position() {
        let settings = RunSettings::minimal_for_tests();
        let staves = vec![RawStave { position_tag: "kempli".to_string(), passes: None, measures: vec![], line: 1 }];
        let mut diags = Diagnostics::new();
        let resolved = resolve_staves(&staves, 0, &settings, &mut diags);
        assert!(!diags.has_errors());
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].position, Position::Kempli);
        assert_eq!(resolved[0].group, 0);
    }

    #[test]
    fn unknown_tag_reports_resolution_error_with_line() {
        let settings = RunSettings::minimal_for_tests();
        let staves = vec![RawStave { position_tag: "bogus".to_string(), passes: None, measures: vec![], line: 7 }];
        let mut diags = Diagnostics::new();
        let resolved = resolve_staves(&staves, 0, &settings, &mut diags);
        assert!(resolved.is_empty());
        assert!(diags.has_errors());
        assert_eq!(diags.errors()[0].location().unwrap().line, Some(7));
    }
}
