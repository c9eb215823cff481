//! # Instrument Positions
//!
//! A `Position` names one instrument role in the ensemble.
//! Positions are grouped under a parent `InstrumentType` by stripping the
//! role suffix (`_POLOS`, `_SANGSIH`, a reyong number, ...), and each carries
//! a short code used in the notation file and the "corrected" round-trip
//! output (`notation::score_to_notation`).
//!
//! The concrete tag→position table (which notation tag strings resolve to
//! which positions) is supplied externally at runtime via
//! [`crate::settings::RunSettings`] (Non-goals: tag tables are
//! config, not hard-coded here) — this module only fixes the *set* of
//! positions the rest of the pipeline can address, grounded on
//! `examples/original_source/src/common/classes.py`'s `Position` /
//! `InstrumentType` enumerations.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Position {
    Ugal,
    PemadePolos,
    PemadeSangsih,
    KantilanPolos,
    KantilanSangsih,
    Reyong1,
    Reyong2,
    Reyong3,
    Reyong4,
    Calung,
    Jegogan,
    Penyacah,
    Kendang,
    Kempli,
    Gongs,
    Suling,
}

/// The parent instrument family a `Position` belongs to, obtained by
/// stripping the polos/sangsih/number suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentType {
    Ugal,
    Pemade,
    Kantilan,
    Reyong,
    Calung,
    Jegogan,
    Penyacah,
    Kendang,
    Kempli,
    Gongs,
    Suling,
}

impl Position {
    /// All positions the pipeline can address, in emission order: one
    /// track per active position, ordered by this sequence.
    pub const ALL: &'static [Position] = &[
        Position::Ugal,
        Position::PemadePolos,
        Position::PemadeSangsih,
        Position::KantilanPolos,
        Position::KantilanSangsih,
        Position::Reyong1,
        Position::Reyong2,
        Position::Reyong3,
        Position::Reyong4,
        Position::Calung,
        Position::Jegogan,
        Position::Penyacah,
        Position::Kendang,
        Position::Kempli,
        Position::Gongs,
        Position::Suling,
    ];

    pub fn instrument_type(self) -> InstrumentType {
        match self {
            Position::Ugal => InstrumentType::Ugal,
            Position::PemadePolos | Position::PemadeSangsih => InstrumentType::Pemade,
            Position::KantilanPolos | Position::KantilanSangsih => InstrumentType::Kantilan,
            Position::Reyong1 | Position::Reyong2 | Position::Reyong3 | Position::Reyong4 => {
                InstrumentType::Reyong
            }
            Position::Calung => InstrumentType::Calung,
            Position::Jegogan => InstrumentType::Jegogan,
            Position::Penyacah => InstrumentType::Penyacah,
            Position::Kendang => InstrumentType::Kendang,
            Position::Kempli => InstrumentType::Kempli,
            Position::Gongs => InstrumentType::Gongs,
            Position::Suling => InstrumentType::Suling,
        }
    }

    /// Short code used in the notation file's position tag and the
    /// "corrected" round-trip output.
    pub fn short_code(self) -> &'static str {
        match self {
            Position::Ugal => "ugal",
            Position::PemadePolos => "pemade_p",
            Position::PemadeSangsih => "pemade_s",
            Position::KantilanPolos => "kantilan_p",
            Position::KantilanSangsih => "kantilan_s",
            Position::Reyong1 => "reyong_1",
            Position::Reyong2 => "reyong_2",
            Position::Reyong3 => "reyong_3",
            Position::Reyong4 => "reyong_4",
            Position::Calung => "calung",
            Position::Jegogan => "jegogan",
            Position::Penyacah => "penyacah",
            Position::Kendang => "kendang",
            Position::Kempli => "kempli",
            Position::Gongs => "gongs",
            Position::Suling => "suling",
        }
    }

    /// Positions whose shorthand pokok notation the builder auto-extends
    /// with `EXTENSION` rests by default. Settings may
    /// override this set; this is the documented default.
    pub fn default_shorthand_positions() -> &'static [Position] {
        &[
            Position::Ugal,
            Position::Calung,
            Position::Jegogan,
            Position::Gongs,
            Position::Kempli,
        ]
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reyong_positions_share_instrument_type() {
        assert_eq!(
            Position::Reyong1.instrument_type(),
            Position::Reyong4.instrument_type()
        );
    }

    #[test]
    fn pemade_polos_and_sangsih_share_instrument_type_but_differ() {
        assert_eq!(
            Position::PemadePolos.instrument_type(),
            Position::PemadeSangsih.instrument_type()
        );
        assert_ne!(Position::PemadePolos, Position::PemadeSangsih);
    }

    #[test]
    fn default_shorthand_positions_contains_jegogan() {
        assert!(Position::default_shorthand_positions().contains(&Position::Jegogan));
    }
}
