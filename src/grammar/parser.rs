//! # Grammar Parser (Stage A)
//!
//! Turns notation source text into a raw parse structure keyed by gongan:
//! METADATA, COMMENTS, and STAVES. This stage does not
//! resolve instrument tags, bind metadata to typed variants, or interpret
//! symbol meaning — it only recognizes the file's syntactic shape, leaving
//! semantic binding to later stages.
//!
//! A blank line separates gongans. Each non-blank line's
//! first tab-separated field is `metadata`, `comment`, or a position tag
//! (optionally `tag:N` / `tag:N-M`); metadata/comment lines carry exactly
//! one further payload field.

use super::lexer::{tokenize_symbols, MetadataLexer, Token};
use crate::error::{Diagnostics, GamelanError, Location};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct RawMetadata {
    pub keyword: String,
    pub default_value: Option<String>,
    pub params: HashMap<String, String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawStave {
    pub position_tag: String,
    pub passes: Option<Vec<i32>>,
    pub measures: Vec<Vec<String>>,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGongan {
    pub id: usize,
    pub metadata: Vec<RawMetadata>,
    pub comments: Vec<String>,
    pub staves: Vec<RawStave>,
    pub line: usize,
}

/// Parses a brace payload's interior (braces already stripped) into a
/// [`RawMetadata`]. Parameter names are not validated against a per-keyword
/// schema here — calls unrecognized parameters a distinct
/// error kind, which [`crate::metadata::bind`] reports once the keyword's
/// shape is known.
pub fn parse_metadata_body(body: &str, line: usize) -> Result<RawMetadata, String> {
    let tokens = MetadataLexer::new(body).tokenize()?;
    let mut idx = 0usize;
    let keyword = match tokens.get(idx) {
        Some(Token::Ident(s)) => s.clone(),
        _ => return Err("metadata record is missing its keyword".to_string()),
    };
    idx += 1;

    let mut default_value = None;
    let is_key_value_start = |tokens: &[Token], at: usize| {
        matches!(tokens.get(at), Some(Token::Ident(_))) && matches!(tokens.get(at + 1), Some(Token::Equals))
    };
    if idx < tokens.len() && !is_key_value_start(&tokens, idx) {
        let (value, next) = collect_value(&tokens, idx)?;
        default_value = Some(value);
        idx = next;
        if idx < tokens.len() && tokens[idx] == Token::Comma {
            idx += 1;
        }
    }

    let mut params = HashMap::new();
    while idx < tokens.len() {
        let key = match &tokens[idx] {
            Token::Ident(s) => s.clone(),
            other => return Err(format!("expected parameter name, found {other:?}")),
        };
        idx += 1;
        match tokens.get(idx) {
            Some(Token::Equals) => idx += 1,
            other => return Err(format!("expected '=' after parameter {key:?}, found {other:?}")),
        }
        let (value, next) = collect_value(&tokens, idx)?;
        if params.insert(key.clone(), value).is_some() {
            return Err(format!("duplicate parameter {key:?}"));
        }
        idx = next;
        if idx < tokens.len() {
            match tokens[idx] {
                Token::Comma => idx += 1,
                _ => return Err(format!("expected ',' between parameters, found {:?}", tokens[idx])),
            }
        }
    }

    Ok(RawMetadata { keyword, default_value, params, line })
}

fn collect_value(tokens: &[Token], idx: usize) -> Result<(String, usize), String> {
    match tokens.get(idx) {
        Some(Token::Ident(s)) | Some(Token::Str(s)) => Ok((s.clone(), idx + 1)),
        Some(Token::ListOpen) => {
            let mut items = Vec::new();
            let mut i = idx + 1;
            loop {
                match tokens.get(i) {
                    Some(Token::ListClose) => {
                        i += 1;
                        break;
                    }
                    Some(Token::Ident(s)) | Some(Token::Str(s)) => {
                        items.push(s.clone());
                        i += 1;
                    }
                    Some(Token::Comma) => {
                        i += 1;
                    }
                    other => return Err(format!("malformed list, found {other:?}")),
                }
            }
            Ok((items.join(","), i))
        }
        other => Err(format!("expected a value, found {other:?}")),
    }
}

/// Splits a position field into its tag and optional pass selector,
/// e.g. `"gangsa:2-4"` -> `("gangsa", Some([2, 3, 4]))`.
fn parse_position_field(field: &str) -> (String, Option<Vec<i32>>) {
    match field.split_once(':') {
        None => (field.to_string(), None),
        Some((tag, selector)) => {
            let passes = match selector.split_once('-') {
                Some((start, end)) => {
                    let start: i32 = start.trim().parse().unwrap_or(1);
                    let end: i32 = end.trim().parse().unwrap_or(start);
                    (start..=end).collect()
                }
                None => selector.trim().parse().ok().into_iter().collect(),
            };
            (tag.to_string(), Some(passes))
        }
    }
}

/// Parses the whole notation source, returning one [`RawGongan`] per
/// blank-line-delimited block plus accumulated diagnostics. A malformed
/// line is skipped (consuming up to the next newline) so later lines keep
/// being parsed.
pub fn parse(text: &str) -> (Vec<RawGongan>, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let mut gongans = Vec::new();

    let numbered_lines: Vec<(usize, &str)> = text.lines().enumerate().map(|(i, l)| (i + 1, l)).collect();
    let mut block: Vec<(usize, &str)> = Vec::new();
    let mut blocks: Vec<Vec<(usize, &str)>> = Vec::new();
    for (lineno, line) in numbered_lines {
        if line.trim().is_empty() {
            if !block.is_empty() {
                blocks.push(std::mem::take(&mut block));
            }
        } else {
            block.push((lineno, line));
        }
    }
    if !block.is_empty() {
        blocks.push(block);
    }

    for (gongan_id, block) in blocks.into_iter().enumerate() {
        let block_line = block.first().map(|(n, _)| *n).unwrap_or(0);
        let mut gongan = RawGongan { id: gongan_id, line: block_line, ..Default::default() };
        for (lineno, line) in block {
            let mut fields = line.split('\t');
            let Some(first) = fields.next() else { continue };
            let first = first.trim();
            let location = Location { gongan: Some(gongan_id), beat: None, position: None, line: Some(lineno) };

            if first.eq_ignore_ascii_case("metadata") {
                let Some(payload) = fields.next() else {
                    diagnostics.error(GamelanError::Grammar {
                        location,
                        message: "metadata line has no payload field".to_string(),
                    });
                    continue;
                };
                let trimmed = payload.trim();
                let Some(body) = trimmed.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
                    diagnostics.error(GamelanError::Grammar {
                        location,
                        message: format!("metadata payload {trimmed:?} is not brace-enclosed"),
                    });
                    continue;
                };
                match parse_metadata_body(body, lineno) {
                    Ok(raw) => gongan.metadata.push(raw),
                    Err(message) => diagnostics.error(GamelanError::Grammar { location, message }),
                }
            } else if first.eq_ignore_ascii_case("comment") {
                gongan.comments.push(fields.next().unwrap_or("").to_string());
            } else {
                let (tag, passes) = parse_position_field(first);
                let measures: Vec<Vec<String>> = fields.map(tokenize_symbols).collect();
                gongan.staves.push(RawStave { position_tag: tag, passes, measures, line: lineno });
            }
        }
        gongans.push(gongan);
    }

    (gongans, diagnostics)
}
