//! Part 21 (STEP physical file format) lexer.
//!
//! Tokenizes exchange structures according to ISO 10303-21. The lexer is a
//! small state machine with one transition function per state:
//!
//! - `Normal`: keywords, entity ids, numbers, enumerations, binaries,
//!   punctuation and the start of comments and quoted text
//! - `InComment`: everything up to `*/`
//! - `InQuotedText`: text that may span lines, with `''` escapes
//! - `AfterEnd`: trailing content after `END-ISO-10303-21;` (discarded)
//!
//! The lexer never fails. Bytes it cannot make sense of are skipped and
//! recorded as warnings; the parser reports whatever grammar errors follow.

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::position::{Cursor, Position};
use crate::token::{KeywordTable, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    InComment { start: Position },
    InQuotedText { start: Position },
    AfterEnd { terminated: bool },
}

/// Result of one transition.
enum Step {
    Emit(Token),
    Continue,
    Done,
}

/// Lexer for Part 21 files.
pub struct Lexer<'a> {
    input: &'a [u8],
    cursor: Cursor<'a>,
    keywords: &'a KeywordTable,
    state: State,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a [u8], keywords: &'a KeywordTable) -> Self {
        Self {
            input,
            cursor: Cursor::new(input),
            keywords,
            state: State::Normal,
            diagnostics: Vec::new(),
        }
    }

    /// Get the next token, or `None` once the input is exhausted.
    pub fn next_token(&mut self) -> Option<Token> {
        loop {
            let step = match self.state {
                State::Normal => self.scan_normal(),
                State::InComment { start } => self.scan_comment(start),
                State::InQuotedText { start } => self.scan_text(start),
                State::AfterEnd { terminated } => self.scan_after_end(terminated),
            };
            match step {
                Step::Emit(token) => return Some(token),
                Step::Continue => continue,
                Step::Done => return None,
            }
        }
    }

    /// Drain the lexical diagnostics collected so far.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Current position in the input.
    pub fn position(&self) -> Position {
        self.cursor.position()
    }

    fn warn(&mut self, pos: Position, kind: DiagnosticKind) {
        self.diagnostics.push(Diagnostic::new(pos, kind));
    }

    fn scan_normal(&mut self) -> Step {
        self.skip_whitespace();

        let pos = self.cursor.position();
        let Some(ch) = self.cursor.peek() else {
            return Step::Done;
        };

        let kind = match ch {
            b'/' if self.cursor.peek_at(1) == Some(b'*') => {
                self.cursor.bump();
                self.cursor.bump();
                self.state = State::InComment { start: pos };
                return Step::Emit(Token::new(TokenKind::CommentBegin, "/*", pos));
            }
            b'\'' => {
                self.cursor.bump();
                self.state = State::InQuotedText { start: pos };
                return Step::Continue;
            }
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'=' => TokenKind::Equals,
            b'/' => TokenKind::Slash,
            b'$' => TokenKind::VoidLiteral,
            b'*' => TokenKind::DerivedLiteral,
            b'#' => return Step::Emit(self.read_entity_id(pos)),
            b'"' => return Step::Emit(self.read_binary(pos)),
            b'!' => return Step::Emit(self.read_user_keyword(pos)),
            b'.' if self.cursor.peek_at(1).is_some_and(is_keyword_start) => {
                return Step::Emit(self.read_enum(pos));
            }
            b'.' if self.cursor.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                return Step::Emit(self.read_number(pos));
            }
            b'0'..=b'9' => return Step::Emit(self.read_number(pos)),
            b'-' | b'+' if self.starts_number_after_sign() => {
                return Step::Emit(self.read_number(pos));
            }
            b'&' if self.starts_with_ignore_case(b"&SCOPE") => {
                for _ in 0..6 {
                    self.cursor.bump();
                }
                return Step::Emit(Token::new(TokenKind::ScopeStart, "&SCOPE", pos));
            }
            c if is_keyword_start(c) => return Step::Emit(self.read_keyword(pos)),
            _ => {
                self.skip_stray(pos);
                return Step::Continue;
            }
        };

        self.cursor.bump();
        Step::Emit(Token::new(kind, (ch as char).to_string(), pos))
    }

    fn scan_comment(&mut self, start: Position) -> Step {
        let mut body = Vec::new();
        loop {
            if self.cursor.starts_with(b"*/") {
                let pos = self.cursor.position();
                self.cursor.bump();
                self.cursor.bump();
                self.state = State::Normal;
                return Step::Emit(Token::new(TokenKind::CommentEnd, decode_bytes(body), pos));
            }
            match self.cursor.bump() {
                Some(ch) => body.push(ch),
                None => {
                    self.warn(start, DiagnosticKind::UnterminatedComment);
                    self.state = State::Normal;
                    let pos = self.cursor.position();
                    return Step::Emit(Token::new(TokenKind::CommentEnd, decode_bytes(body), pos));
                }
            }
        }
    }

    /// Accumulate text after the opening quote up to the closing one.
    ///
    /// A quote closes the literal only when it is followed by a delimiter
    /// (`,`, `)`, `;`, a comment or end of input). A quote followed by
    /// whitespace also closes it, with a warning when the next significant
    /// byte is not a delimiter. Any other lone quote is content.
    fn scan_text(&mut self, start: Position) -> Step {
        let mut content = Vec::new();
        loop {
            match self.cursor.peek() {
                None => {
                    self.warn(start, DiagnosticKind::UnterminatedText);
                    break;
                }
                Some(b'\'') => {
                    let quote_pos = self.cursor.position();
                    self.cursor.bump();
                    match self.cursor.peek() {
                        Some(b'\'') => {
                            self.cursor.bump();
                            content.push(b'\'');
                        }
                        None | Some(b',' | b')' | b';') => break,
                        Some(b'/') if self.cursor.peek_at(1) == Some(b'*') => break,
                        Some(c) if is_whitespace(c) => {
                            if !self.significant_is_delimiter() {
                                self.warn(quote_pos, DiagnosticKind::AmbiguousQuote);
                            }
                            break;
                        }
                        Some(_) => {
                            self.warn(quote_pos, DiagnosticKind::UnescapedQuote);
                            content.push(b'\'');
                        }
                    }
                }
                Some(_) => {
                    if let Some(ch) = self.cursor.bump() {
                        content.push(ch);
                    }
                }
            }
        }
        self.state = State::Normal;
        Step::Emit(Token::new(TokenKind::QuotedText, decode_bytes(content), start))
    }

    fn scan_after_end(&mut self, terminated: bool) -> Step {
        self.state = State::AfterEnd { terminated: true };
        if !terminated {
            self.skip_whitespace_and_comments();
            if self.cursor.peek() == Some(b';') {
                let pos = self.cursor.position();
                self.cursor.bump();
                return Step::Emit(Token::new(TokenKind::Semicolon, ";", pos));
            }
        }
        self.cursor.skip_to_end();
        Step::Done
    }

    fn skip_whitespace(&mut self) {
        while self.cursor.peek().is_some_and(is_whitespace) {
            self.cursor.bump();
        }
    }

    /// Comments are dropped here without producing tokens.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            self.skip_whitespace();
            if !self.cursor.starts_with(b"/*") {
                return;
            }
            self.cursor.bump();
            self.cursor.bump();
            while !self.cursor.is_eof() && !self.cursor.starts_with(b"*/") {
                self.cursor.bump();
            }
            self.cursor.bump();
            self.cursor.bump();
        }
    }

    /// Whether the first non-whitespace byte ahead ends a text literal.
    fn significant_is_delimiter(&self) -> bool {
        let mut n = 0;
        while self.cursor.peek_at(n).is_some_and(is_whitespace) {
            n += 1;
        }
        matches!(
            self.cursor.peek_at(n),
            None | Some(b',' | b')' | b';' | b'/')
        )
    }

    fn starts_number_after_sign(&self) -> bool {
        match self.cursor.peek_at(1) {
            Some(c) if c.is_ascii_digit() => true,
            Some(b'.') => self.cursor.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    fn starts_with_ignore_case(&self, word: &[u8]) -> bool {
        (0..word.len()).all(|i| {
            self.cursor
                .peek_at(i)
                .is_some_and(|c| c.eq_ignore_ascii_case(&word[i]))
        })
    }

    fn skip_stray(&mut self, pos: Position) {
        let start = self.cursor.offset();
        self.cursor.bump();
        while let Some(ch) = self.cursor.peek() {
            if can_start_token(ch) {
                break;
            }
            self.cursor.bump();
        }
        let text = String::from_utf8_lossy(&self.input[start..self.cursor.offset()]).into_owned();
        self.warn(pos, DiagnosticKind::StrayInput { text });
    }

    fn read_entity_id(&mut self, pos: Position) -> Token {
        self.cursor.bump(); // '#'
        let digits = self.cursor.bump_while(|c| c.is_ascii_digit());
        let mut lexeme = String::with_capacity(digits.len() + 1);
        lexeme.push('#');
        lexeme.push_str(&String::from_utf8_lossy(digits));
        Token::new(TokenKind::EntityId, lexeme, pos)
    }

    fn read_binary(&mut self, pos: Position) -> Token {
        let start = self.cursor.offset();
        self.cursor.bump(); // opening '"'
        self.cursor.bump_while(|c| c != b'"');
        if self.cursor.peek() == Some(b'"') {
            self.cursor.bump();
        }
        let raw = String::from_utf8_lossy(&self.input[start..self.cursor.offset()]).into_owned();
        Token::new(TokenKind::HexLiteral, raw, pos)
    }

    fn read_enum(&mut self, pos: Position) -> Token {
        self.cursor.bump(); // opening '.'
        let name = self
            .cursor
            .bump_while(|c| c.is_ascii_alphanumeric() || c == b'_');
        let mut lexeme = format!(".{}", String::from_utf8_lossy(name).to_ascii_uppercase());
        if self.cursor.peek() == Some(b'.') {
            self.cursor.bump();
            lexeme.push('.');
        }
        Token::new(TokenKind::EnumLiteral, lexeme, pos)
    }

    fn read_number(&mut self, pos: Position) -> Token {
        let start = self.cursor.offset();
        let mut is_real = false;

        // Sign
        if let Some(b'-' | b'+') = self.cursor.peek() {
            self.cursor.bump();
        }

        // Integer part
        self.cursor.bump_while(|c| c.is_ascii_digit());

        // Decimal part; `0.` is a complete real
        if self.cursor.peek() == Some(b'.') {
            is_real = true;
            self.cursor.bump();
            self.cursor.bump_while(|c| c.is_ascii_digit());
        }

        // Exponent part
        if let Some(b'E' | b'e') = self.cursor.peek() {
            let has_digits = match self.cursor.peek_at(1) {
                Some(c) if c.is_ascii_digit() => true,
                Some(b'-' | b'+') => self.cursor.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if has_digits {
                is_real = true;
                self.cursor.bump();
                if let Some(b'-' | b'+') = self.cursor.peek() {
                    self.cursor.bump();
                }
                self.cursor.bump_while(|c| c.is_ascii_digit());
            }
        }

        let lexeme = String::from_utf8_lossy(&self.input[start..self.cursor.offset()]).into_owned();
        let kind = if is_real {
            TokenKind::RealLiteral
        } else {
            TokenKind::IntegerLiteral
        };
        Token::new(kind, lexeme, pos)
    }

    fn read_user_keyword(&mut self, pos: Position) -> Token {
        self.cursor.bump(); // '!'
        let name = self.cursor.bump_while(is_keyword_char);
        let lexeme = format!("!{}", String::from_utf8_lossy(name).to_ascii_uppercase());
        Token::new(TokenKind::Identifier, lexeme, pos)
    }

    fn read_keyword(&mut self, pos: Position) -> Token {
        // Keywords can include hyphens for ISO-10303-21 and END-ISO-10303-21
        let name = self.cursor.bump_while(is_keyword_char);
        let word = String::from_utf8_lossy(name).to_ascii_uppercase();
        let kind = self.keywords.get(&word).unwrap_or(TokenKind::TypeName);
        if kind == TokenKind::FileEnd {
            self.state = State::AfterEnd { terminated: false };
        }
        Token::new(kind, word, pos)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

fn is_keyword_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_keyword_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'-'
}

fn can_start_token(c: u8) -> bool {
    is_whitespace(c)
        || is_keyword_char(c)
        || matches!(
            c,
            b'(' | b')' | b',' | b';' | b'=' | b'/' | b'$' | b'*' | b'#' | b'\'' | b'"' | b'.'
                | b'!' | b'&' | b'+'
        )
}

/// Decode raw bytes as UTF-8, falling back to Latin-1 for anything else.
fn decode_bytes(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}
