//! # Error Types
//!
//! This module defines all error kinds for the gamelan notation compiler.
//!
//! Every error carries whatever location context is available at the point
//! it was raised (gongan id, beat id, position, source line). Rather than
//! returning a single error and aborting immediately, each pipeline stage
//! here collects errors and warnings into a [`Diagnostics`] accumulator so
//! a run can surface several problems at once.
//!
//! ## Usage
//! ```rust
//! use gamelan_notation::error::{GamelanError, Diagnostics, Location};
//!
//! let mut diagnostics = Diagnostics::new();
//! diagnostics.error(GamelanError::Symbol {
//!     location: Location { gongan: Some(1), beat: Some(1), position: None, line: Some(4) },
//!     message: "unknown character 'Q'".to_string(),
//! });
//! assert!(diagnostics.has_errors());
//! ```

use crate::position::Position;
use thiserror::Error;

/// Where in the score an error or warning occurred. All fields are
/// optional because not every stage has resolved every coordinate yet
/// (e.g. the grammar parser knows a line number but not yet a beat id).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    pub gongan: Option<usize>,
    pub beat: Option<usize>,
    pub position: Option<Position>,
    pub line: Option<usize>,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(g) = self.gongan {
            parts.push(format!("gongan {g}"));
        }
        if let Some(b) = self.beat {
            parts.push(format!("beat {b}"));
        }
        if let Some(p) = self.position {
            parts.push(format!("position {p}"));
        }
        if let Some(l) = self.line {
            parts.push(format!("line {l}"));
        }
        if parts.is_empty() {
            write!(f, "(no location)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// The eight error kinds the compiler can raise, each carrying a
/// [`Location`] and a human-readable message.
#[derive(Error, Debug, Clone)]
pub enum GamelanError {
    /// Unexpected token, unknown metadata keyword, or bad parameter while
    /// parsing the notation grammar.
    #[error("grammar error at {location}: {message}")]
    Grammar { location: Location, message: String },

    /// Unknown instrument tag, unresolved label, or a label defined twice.
    #[error("resolution error at {location}: {message}")]
    Resolution { location: Location, message: String },

    /// Unknown character or illegal modifier chain while casting a symbol.
    #[error("symbol error at {location}: {message}")]
    Symbol { location: Location, message: String },

    /// Pitch/octave/stroke combination outside the instrument's valid set.
    #[error("range error at {location}: {message}")]
    Range { location: Location, message: String },

    /// Non-power-of-two beat in a regular gongan, or unequal measure
    /// lengths that autocorrect could not fix.
    #[error("structure error at {location}: {message}")]
    Structure { location: Location, message: String },

    /// Kempyung mismatch not correctable given the instrument's range.
    #[error("rule error at {location}: {message}")]
    Rule { location: Location, message: String },

    /// Missing or inconsistent settings; duplicate symbols in the font
    /// table.
    #[error("config error: {message}")]
    Config { message: String },

    /// File read/write or atomic rename failure.
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl GamelanError {
    pub fn location(&self) -> Option<&Location> {
        match self {
            GamelanError::Grammar { location, .. }
            | GamelanError::Resolution { location, .. }
            | GamelanError::Symbol { location, .. }
            | GamelanError::Range { location, .. }
            | GamelanError::Structure { location, .. }
            | GamelanError::Rule { location, .. } => Some(location),
            GamelanError::Config { .. } | GamelanError::Io { .. } => None,
        }
    }

    /// Short kind name, used by the pipeline driver's summary report
    /// (counts of errors grouped by kind).
    pub fn kind_name(&self) -> &'static str {
        match self {
            GamelanError::Grammar { .. } => "GrammarError",
            GamelanError::Resolution { .. } => "ResolutionError",
            GamelanError::Symbol { .. } => "SymbolError",
            GamelanError::Range { .. } => "RangeError",
            GamelanError::Structure { .. } => "StructureError",
            GamelanError::Rule { .. } => "RuleError",
            GamelanError::Config { .. } => "ConfigError",
            GamelanError::Io { .. } => "IOError",
        }
    }
}

impl From<std::io::Error> for GamelanError {
    fn from(e: std::io::Error) -> Self {
        GamelanError::Io {
            message: e.to_string(),
        }
    }
}

/// A non-fatal note raised during a stage, e.g. an autocorrection applied
/// by the Validator.
#[derive(Debug, Clone)]
pub struct Warning {
    pub location: Location,
    pub message: String,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Accumulates errors and warnings for one pipeline stage (or the whole
/// run). Warnings never abort the pipeline; if `has_errors()` is true at a
/// stage boundary, the driver aborts.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    errors: Vec<GamelanError>,
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, err: GamelanError) {
        log::error!("{err}");
        self.errors.push(err);
    }

    pub fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn info(&self, location: &Location, message: &str) {
        log::info!("{location}: {message}");
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[GamelanError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Counts per error kind, for the driver's summary report.
    pub fn error_counts(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for err in &self.errors {
            let kind = err.kind_name();
            if let Some(entry) = counts.iter_mut().find(|(k, _)| *k == kind) {
                entry.1 += 1;
            } else {
                counts.push((kind, 1));
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_collects_multiple_errors() {
        let mut d = Diagnostics::new();
        d.error(GamelanError::Config {
            message: "a".into(),
        });
        d.error(GamelanError::Config {
            message: "b".into(),
        });
        assert!(d.has_errors());
        assert_eq!(d.errors().len(), 2);
    }

    #[test]
    fn error_counts_groups_by_kind() {
        let mut d = Diagnostics::new();
        d.error(GamelanError::Config {
            message: "a".into(),
        });
        d.error(GamelanError::Io {
            message: "b".into(),
        });
        d.error(GamelanError::Config {
            message: "c".into(),
        });
        let counts = d.error_counts();
        assert!(counts.contains(&("ConfigError", 2)));
        assert!(counts.contains(&("IOError", 1)));
    }
}
