//! Decoder for flat object literals of quoted strings.
//!
//! Accepts exactly `{ 'key': 'value', "key2": "value2" }`: keys and values are
//! single- or double-quoted strings, an optional trailing comma is allowed,
//! nothing may be nested. This is not a script-language parser.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::CharIndices;

/// Why a literal could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason} at offset {offset}")]
pub struct LiteralError {
    /// Byte offset into the literal where decoding stopped.
    pub offset: usize,
    /// What was expected.
    pub reason: &'static str,
}

/// Decodes a flat `{ 'k': 'v', ... }` literal. Later duplicate keys win.
///
/// # Errors
///
/// Returns [`LiteralError`] for anything other than the accepted shape.
pub fn parse_string_mapping(literal: &str) -> Result<HashMap<String, String>, LiteralError> {
    let mut scanner = Scanner {
        chars: literal.char_indices().peekable(),
        len: literal.len(),
    };
    let mut mapping = HashMap::new();

    scanner.skip_whitespace();
    scanner.expect('{', "expected '{'")?;

    loop {
        scanner.skip_whitespace();
        if scanner.eat('}') {
            break;
        }

        let key = scanner.string()?;
        scanner.skip_whitespace();
        scanner.expect(':', "expected ':' after key")?;
        scanner.skip_whitespace();
        let value = scanner.string()?;
        mapping.insert(key, value);

        scanner.skip_whitespace();
        if scanner.eat(',') {
            continue;
        }
        scanner.expect('}', "expected ',' or '}'")?;
        break;
    }

    scanner.skip_whitespace();
    if scanner.chars.peek().is_some() {
        return Err(scanner.error("unexpected text after '}'"));
    }
    Ok(mapping)
}

struct Scanner<'a> {
    chars: Peekable<CharIndices<'a>>,
    len: usize,
}

impl Scanner<'_> {
    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.len, |(idx, _)| *idx)
    }

    fn error(&mut self, reason: &'static str) -> LiteralError {
        LiteralError {
            offset: self.offset(),
            reason,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn eat(&mut self, expected: char) -> bool {
        self.chars.next_if(|(_, c)| *c == expected).is_some()
    }

    fn expect(&mut self, expected: char, reason: &'static str) -> Result<(), LiteralError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(reason))
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = match self.chars.peek() {
            Some((_, q @ ('\'' | '"'))) => *q,
            _ => return Err(self.error("expected quoted string")),
        };
        self.chars.next();

        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => return Ok(out),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, escaped)) => out.push(escaped),
                    None => return Err(self.error("unterminated escape")),
                },
                Some((_, '\n')) => return Err(self.error("newline inside string")),
                Some((_, c)) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }
}
