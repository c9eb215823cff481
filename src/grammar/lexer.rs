//! # Metadata Lexer
//!
//! Tokenizes the brace-enclosed metadata payload `{KEYWORD [value]
//! [key=value, ...]}` and the tab-separated measure cells of
//! a stave line into raw symbol groups. Character-by-character, built on
//! `Peekable<Chars>`.

use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    ListOpen,
    ListClose,
    Equals,
    Comma,
}

pub struct MetadataLexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> MetadataLexer<'a> {
    pub fn new(body: &'a str) -> Self {
        MetadataLexer { chars: body.chars().peekable() }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                ' ' | '\t' => {
                    self.chars.next();
                }
                ',' => {
                    self.chars.next();
                    tokens.push(Token::Comma);
                }
                '=' => {
                    self.chars.next();
                    tokens.push(Token::Equals);
                }
                '[' => {
                    self.chars.next();
                    tokens.push(Token::ListOpen);
                }
                ']' => {
                    self.chars.next();
                    tokens.push(Token::ListClose);
                }
                '"' | '\'' => {
                    let quote = c;
                    self.chars.next();
                    let mut s = String::new();
                    loop {
                        match self.chars.next() {
                            Some(ch) if ch == quote => break,
                            Some(ch) => s.push(ch),
                            None => return Err("unterminated string in metadata".to_string()),
                        }
                    }
                    tokens.push(Token::Str(s));
                }
                _ => {
                    let mut s = String::new();
                    while let Some(&ch) = self.chars.peek() {
                        if ch.is_whitespace() || matches!(ch, ',' | '=' | '[' | ']') {
                            break;
                        }
                        s.push(ch);
                        self.chars.next();
                    }
                    if s.is_empty() {
                        return Err(format!("unexpected character {c:?} in metadata"));
                    }
                    tokens.push(Token::Ident(s));
                }
            }
        }
        Ok(tokens)
    }
}

/// Which characters a measure symbol may start with: a font base symbol is
/// alphabetic or one of the two non-sounding markers `-`/`.`. Modifier
/// characters (octave, abbreviation, mute, duration, tremolo) keep
/// accumulating onto the current symbol until the next base character or
/// whitespace: a note is one pitch character optionally followed by
/// modifier characters.
fn is_base_char(c: char) -> bool {
    c.is_alphabetic() || c == '-' || c == '.'
}

/// Splits one tab-separated measure cell into its raw symbol groups, e.g.
/// `"o,o<e/u"` -> `["o,", "o<", "e/", "u"]`.
pub fn tokenize_symbols(cell: &str) -> Vec<String> {
    let mut symbols = Vec::new();
    let mut current = String::new();
    for c in cell.chars() {
        if c.is_whitespace() {
            continue;
        }
        if is_base_char(c) && !current.is_empty() {
            symbols.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        symbols.push(current);
    }
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_symbols_splits_on_base_characters() {
        let symbols = tokenize_symbols("o,o<e/u");
        assert_eq!(symbols, vec!["o,", "o<", "e/", "u"]);
    }

    #[test]
    fn tokenize_symbols_keeps_extension_and_silence_separate() {
        assert_eq!(tokenize_symbols("o--."), vec!["o", "-", "-", "."]);
    }

    #[test]
    fn metadata_lexer_tokenizes_keyword_value_and_params() {
        let tokens = MetadataLexer::new("TEMPO value=120, first_beat=1").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("TEMPO".to_string()),
                Token::Ident("value".to_string()),
                Token::Equals,
                Token::Ident("120".to_string()),
                Token::Comma,
                Token::Ident("first_beat".to_string()),
                Token::Equals,
                Token::Ident("1".to_string()),
            ]
        );
    }

    #[test]
    fn metadata_lexer_tokenizes_bracketed_list() {
        let tokens = MetadataLexer::new("SEQUENCE [A, B, C]").tokenize().unwrap();
        assert_eq!(tokens[1], Token::ListOpen);
        assert_eq!(tokens.last(), Some(&Token::ListClose));
    }

    #[test]
    fn metadata_lexer_reads_quoted_strings() {
        let tokens = MetadataLexer::new("COMMENT \"hello world\"").tokenize().unwrap();
        assert_eq!(tokens[1], Token::Str("hello world".to_string()));
    }
}
