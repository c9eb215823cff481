//! Stage A of the pipeline: tokenises gongans, staves,
//! measures, and inline metadata annotations into the raw structures the
//! later stages ([`crate::tags`], [`crate::metadata`],
//! [`crate::builder`]) resolve.

pub mod lexer;
pub mod parser;

pub use parser::{parse, parse_metadata_body, RawGongan, RawMetadata, RawStave};
