//! Conversion of raw lexemes into typed literal values.
//!
//! Coercion knows nothing about grammar: it only looks at one token at a time.
//! Problems come back as a [`Coerced`] value with an optional warning, or as a
//! hard [`DiagnosticKind`] when the lexeme cannot produce a value at all.

use crate::diagnostic::DiagnosticKind;
use crate::token::{Token, TokenKind};

/// Typed value of a single token.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer number.
    Integer(i64),
    /// Real number.
    Real(f64),
    /// Enumeration name without the dots.
    Enum(String),
    /// Hex digits of a binary, including the leading unused-bits digit.
    Binary(String),
    /// Decoded text.
    Text(String),
    /// `#123`.
    EntityId(u64),
    /// Type name or user-defined keyword.
    Keyword(String),
    /// Punctuation or reserved word; carries the kind only.
    Punct(TokenKind),
    /// `$`.
    Void,
    /// `*`.
    Derived,
}

/// A literal plus a recoverable problem found while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    /// The value.
    pub literal: Literal,
    /// Warning to report next to the value.
    pub warning: Option<DiagnosticKind>,
}

impl Coerced {
    fn clean(literal: Literal) -> Self {
        Self {
            literal,
            warning: None,
        }
    }
}

/// Coerce a token into a literal.
///
/// `decode_text` controls whether text control directives (`\X2\...\X0\` and
/// friends) are decoded.
pub fn coerce(token: &Token, decode_text: bool) -> Result<Coerced, DiagnosticKind> {
    let lexeme = token.lexeme.as_str();
    let literal = match token.kind {
        TokenKind::IntegerLiteral => return Ok(coerce_integer(lexeme)),
        TokenKind::RealLiteral => Literal::Real(parse_real(lexeme)?),
        TokenKind::EntityId => Literal::EntityId(parse_entity_id(lexeme)?),
        TokenKind::EnumLiteral => {
            Literal::Enum(lexeme.trim_start_matches('.').trim_end_matches('.').to_string())
        }
        TokenKind::HexLiteral => Literal::Binary(parse_binary(lexeme)?),
        TokenKind::QuotedText if decode_text => {
            let (text, warning) = decode_control_directives(lexeme);
            return Ok(Coerced {
                literal: Literal::Text(text),
                warning,
            });
        }
        TokenKind::QuotedText => Literal::Text(lexeme.to_string()),
        TokenKind::TypeName | TokenKind::Identifier => Literal::Keyword(lexeme.to_string()),
        TokenKind::VoidLiteral => Literal::Void,
        TokenKind::DerivedLiteral => Literal::Derived,
        kind => Literal::Punct(kind),
    };
    Ok(Coerced::clean(literal))
}

/// Parse an entity id lexeme (`#123`).
pub fn parse_entity_id(lexeme: &str) -> Result<u64, DiagnosticKind> {
    let digits = lexeme.strip_prefix('#').unwrap_or(lexeme);
    digits
        .parse::<u64>()
        .map_err(|_| DiagnosticKind::InvalidEntityId {
            lexeme: lexeme.to_string(),
        })
}

fn coerce_integer(lexeme: &str) -> Coerced {
    match lexeme.parse::<i64>() {
        Ok(v) => Coerced::clean(Literal::Integer(v)),
        Err(_) => {
            // Out of range for i64; keep the magnitude as a real.
            let value = lexeme.parse::<f64>().unwrap_or(f64::NAN);
            Coerced {
                literal: Literal::Real(value),
                warning: Some(DiagnosticKind::InvalidNumber {
                    lexeme: lexeme.to_string(),
                    reason: "integer out of range, read as real".into(),
                }),
            }
        }
    }
}

fn parse_real(lexeme: &str) -> Result<f64, DiagnosticKind> {
    lexeme.parse::<f64>().map_err(|_| DiagnosticKind::InvalidNumber {
        lexeme: lexeme.to_string(),
        reason: "not a real number".into(),
    })
}

fn parse_binary(lexeme: &str) -> Result<String, DiagnosticKind> {
    let invalid = || DiagnosticKind::InvalidBinary {
        lexeme: lexeme.to_string(),
    };
    let inner = lexeme
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(invalid)?;
    let mut chars = inner.chars();
    // First digit counts the unused high bits of the first hex digit (0..=3).
    match chars.next() {
        Some('0'..='3') => {}
        _ => return Err(invalid()),
    }
    if !chars.all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    Ok(inner.to_ascii_uppercase())
}

/// Decode Part 21 control directives inside text.
///
/// Handles `\\`, `\S\c`, `\Px\`, `\X\hh`, `\X2\...\X0\` and `\X4\...\X0\`.
/// Unknown backslash sequences are kept verbatim. A malformed extended
/// sequence is kept verbatim and reported.
pub fn decode_control_directives(raw: &str) -> (String, Option<DiagnosticKind>) {
    if !raw.contains('\\') {
        return (raw.to_string(), None);
    }

    let mut out = String::with_capacity(raw.len());
    let mut warning = None;
    let mut rest = raw;

    while let Some(idx) = rest.find('\\') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];

        match decode_directive(rest) {
            Directive::Decoded(text, consumed) => {
                out.push_str(&text);
                rest = &rest[consumed..];
            }
            Directive::Verbatim => {
                out.push('\\');
                rest = &rest[1..];
            }
            Directive::Malformed(consumed) => {
                if warning.is_none() {
                    warning = Some(DiagnosticKind::InvalidControlDirective {
                        directive: rest[..consumed].to_string(),
                    });
                }
                out.push_str(&rest[..consumed]);
                rest = &rest[consumed..];
            }
        }
    }
    out.push_str(rest);
    (out, warning)
}

enum Directive {
    /// Decoded text and number of input bytes consumed.
    Decoded(String, usize),
    /// Not a directive; keep the backslash.
    Verbatim,
    /// Looked like a directive but was broken; keep this many bytes.
    Malformed(usize),
}

fn decode_directive(s: &str) -> Directive {
    let bytes = s.as_bytes();
    if s.starts_with("\\\\") {
        return Directive::Decoded("\\".into(), 2);
    }
    if s.starts_with("\\S\\") {
        return match s[3..].chars().next() {
            Some(c) if c.is_ascii() => {
                let code = c as u32 + 0x80;
                match char::from_u32(code) {
                    Some(decoded) => Directive::Decoded(decoded.to_string(), 4),
                    None => Directive::Malformed(4),
                }
            }
            _ => Directive::Malformed(3),
        };
    }
    if bytes.len() >= 4 && bytes[1] == b'P' && bytes[3] == b'\\' && bytes[2].is_ascii_uppercase() {
        // Code page selector; text is decoded as Latin-1 regardless.
        return Directive::Decoded(String::new(), 4);
    }
    if s.starts_with("\\X2\\") {
        return decode_extended(s, 4, 4);
    }
    if s.starts_with("\\X4\\") {
        return decode_extended(s, 4, 8);
    }
    if s.starts_with("\\X\\") {
        let hex = s.get(3..5).unwrap_or("");
        if hex.len() != 2 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Directive::Malformed(3);
        }
        return match u8::from_str_radix(hex, 16) {
            Ok(b) => Directive::Decoded(char::from(b).to_string(), 5),
            Err(_) => Directive::Malformed(3),
        };
    }
    Directive::Verbatim
}

/// Decode `\X2\` (UTF-16) or `\X4\` (UTF-32) runs terminated by `\X0\`.
fn decode_extended(s: &str, header: usize, width: usize) -> Directive {
    let Some(end) = s[header..].find("\\X0\\") else {
        return Directive::Malformed(header);
    };
    let body = &s[header..header + end];
    let consumed = header + end + 4;
    if body.len() % width != 0 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Directive::Malformed(consumed);
    }

    let units = (0..body.len())
        .step_by(width)
        .map(|i| u32::from_str_radix(&body[i..i + width], 16));

    let decoded = if width == 4 {
        let utf16: Result<Vec<u16>, _> = units.map(|u| u.map(|v| v as u16)).collect();
        utf16.ok().and_then(|u| String::from_utf16(&u).ok())
    } else {
        units
            .map(|u| u.ok().and_then(char::from_u32))
            .collect::<Option<String>>()
    };

    match decoded {
        Some(text) => Directive::Decoded(text, consumed),
        None => Directive::Malformed(consumed),
    }
}
