//! # Gamelan Notation Compiler
//!
//! A compiler for a tab-separated textual notation of Balinese gamelan
//! music: it reads a score written in a specialized musical font,
//! validates and interprets the domain semantics of every symbol, applies
//! per-instrument rules, and emits a Standard MIDI file.
//!
//! ## Compilation Pipeline
//!
//! ```text
//! notation text → GrammarParser → TagResolver/MetadataBinder/ScoreBuilder
//!               → Validator (+ autocorrect) → FlowInterpreter/MidiEmitter
//! ```
//!
//! 1. **Grammar** ([`grammar`]) - tokenizes gongans, staves, measures, and
//!    inline metadata annotations ([`grammar::lexer`], [`grammar::parser`])
//! 2. **Tags** ([`tags`]) - expands instrument tags to concrete positions
//! 3. **Metadata** ([`metadata`]) - binds raw metadata records to the
//!    typed [`metadata::MetaData`] tagged union
//! 4. **Builder** ([`builder`]) - transposes staves into the beat graph,
//!    casts symbols to [`note::Note`]s, elaborates shorthand notation
//! 5. **Rules** ([`rules`]) - per-instrument-group derivation (kempyung,
//!    unison, reyong selection)
//! 6. **Validator** ([`validator`]) - checks invariants, autocorrects
//! 7. **Flow** ([`flow`]) - walks the score graph and renders a
//!    [`midi::MidiFile`]
//!
//! ## Quick Start
//!
//! ```rust
//! use gamelan_notation::pipeline;
//! use gamelan_notation::settings::RunSettings;
//!
//! let mut settings = RunSettings::minimal_for_tests();
//! settings.options.save_midifile = true;
//!
//! let source = "pemade_polos\tioeu\n";
//! let output = pipeline::run(source, &settings).unwrap();
//! assert!(output.midi.is_some());
//! ```
//!
//! ## Module Structure
//!
//! - [`tone`] - `Pitch`, `Stroke`, `Tone` and the scale-step arithmetic
//!   kempyung derivation depends on
//! - [`position`] - `Position`/`InstrumentType`, the ensemble's instrument
//!   roles
//! - [`note`] - `Note`, validated against a position's valid-note table
//!   at construction
//! - [`model`] - the beat-arena `Score` graph: `Beat`, `Measure`,
//!   `Gongan`
//! - [`error`] - `GamelanError` variants and the `Diagnostics` accumulator
//! - [`settings`] - `RunSettings` and the lookup tables threaded through
//!   every stage
//! - [`grammar`] - Stage A
//! - [`tags`], [`metadata`], [`builder`], [`rules`] - Stage B
//! - [`validator`] - Stage C
//! - [`flow`], [`midi`] - Stage D
//! - [`notation`] - renders a built `Score` back to notation text, for
//!   the "corrected" round-trip file
//! - [`manifest`] - the JSON player-manifest read-merge-write updater
//! - [`io`] - atomic write-to-temp-then-rename file output
//! - [`pipeline`] - the driver tying every stage together

pub mod builder;
pub mod error;
pub mod flow;
pub mod grammar;
pub mod io;
pub mod manifest;
pub mod metadata;
pub mod midi;
pub mod model;
pub mod note;
pub mod notation;
pub mod pipeline;
pub mod position;
pub mod rules;
pub mod settings;
pub mod tags;
pub mod tone;
pub mod validator;

pub use error::{Diagnostics, GamelanError};
pub use model::Score;
pub use pipeline::{run, CompileOutput};
pub use settings::RunSettings;
