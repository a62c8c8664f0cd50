//! Line/column tracking over the raw input bytes.

use serde::Serialize;
use std::fmt;

/// Position in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed).
    pub column: usize,
}

impl Position {
    /// Create a position.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Byte cursor that keeps the current line and column up to date.
///
/// `\r\n` and a lone `\r` are both reported by [`Cursor::bump`] as a single
/// `\n`, so callers only ever see one logical newline per line break.
pub struct Cursor<'a> {
    input: &'a [u8],
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor at the start of `input`.
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Current position.
    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    /// Byte offset of the next unread byte.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether all input has been consumed.
    pub fn is_eof(&self) -> bool {
        self.offset >= self.input.len()
    }

    /// Peek at the next byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.offset).copied()
    }

    /// Peek `n` bytes past the next one (`peek_at(0) == peek()`).
    pub fn peek_at(&self, n: usize) -> Option<u8> {
        self.input.get(self.offset + n).copied()
    }

    /// Whether the unread input starts with `prefix`.
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.input[self.offset..].starts_with(prefix)
    }

    /// Consume one logical character.
    pub fn bump(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.offset += 1;
        match ch {
            b'\r' => {
                if self.peek() == Some(b'\n') {
                    self.offset += 1;
                }
                self.newline();
                Some(b'\n')
            }
            b'\n' => {
                self.newline();
                Some(b'\n')
            }
            _ => {
                self.column += 1;
                Some(ch)
            }
        }
    }

    /// Consume bytes while `pred` holds, returning the consumed slice.
    ///
    /// Only meant for runs that cannot contain line breaks.
    pub fn bump_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.offset;
        while let Some(ch) = self.peek() {
            if ch == b'\n' || ch == b'\r' || !pred(ch) {
                break;
            }
            self.offset += 1;
            self.column += 1;
        }
        &self.input[start..self.offset]
    }

    /// Discard everything that is left.
    pub fn skip_to_end(&mut self) {
        while !self.is_eof() {
            self.bump();
        }
    }

    fn newline(&mut self) {
        self.line += 1;
        self.column = 1;
    }
}
