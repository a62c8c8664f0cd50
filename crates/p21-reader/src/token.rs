//! Tokens produced by the lexer.

use crate::position::Position;
use std::collections::HashMap;
use std::fmt;

/// Kind of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `/*`.
    CommentBegin,
    /// `*/`; the lexeme is the comment body.
    CommentEnd,
    /// Complete quoted text; the lexeme is the reassembled content.
    QuotedText,
    /// `#123`.
    EntityId,
    /// User-defined keyword (`!NAME`).
    Identifier,
    /// Standard keyword used as an entity type name.
    TypeName,
    /// Integer literal.
    IntegerLiteral,
    /// Real literal (has a `.` or an exponent).
    RealLiteral,
    /// `"0F3"`; the lexeme keeps the quotes.
    HexLiteral,
    /// `.NAME.`; the lexeme keeps the dots.
    EnumLiteral,
    /// `$`.
    VoidLiteral,
    /// `*`.
    DerivedLiteral,
    /// `ISO-10303-21`.
    FileBegin,
    /// `HEADER`.
    SectionStart,
    /// `DATA`.
    DataSection,
    /// `ENDSEC`.
    SectionEnd,
    /// `&SCOPE`.
    ScopeStart,
    /// `ENDSCOPE`.
    ScopeEnd,
    /// `END-ISO-10303-21`.
    FileEnd,
    /// `(`.
    LParen,
    /// `)`.
    RParen,
    /// `,`.
    Comma,
    /// `=`.
    Equals,
    /// `;`.
    Semicolon,
    /// `/`.
    Slash,
}

impl TokenKind {
    /// Whether the parser should skip this token.
    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::CommentBegin | TokenKind::CommentEnd)
    }

    /// Short description used in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::CommentBegin => "'/*'",
            TokenKind::CommentEnd => "'*/'",
            TokenKind::QuotedText => "text",
            TokenKind::EntityId => "entity id",
            TokenKind::Identifier => "user-defined keyword",
            TokenKind::TypeName => "type name",
            TokenKind::IntegerLiteral => "integer",
            TokenKind::RealLiteral => "real",
            TokenKind::HexLiteral => "binary",
            TokenKind::EnumLiteral => "enumeration",
            TokenKind::VoidLiteral => "'$'",
            TokenKind::DerivedLiteral => "'*'",
            TokenKind::FileBegin => "'ISO-10303-21'",
            TokenKind::SectionStart => "'HEADER'",
            TokenKind::DataSection => "'DATA'",
            TokenKind::SectionEnd => "'ENDSEC'",
            TokenKind::ScopeStart => "'&SCOPE'",
            TokenKind::ScopeEnd => "'ENDSCOPE'",
            TokenKind::FileEnd => "'END-ISO-10303-21'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::Comma => "','",
            TokenKind::Equals => "'='",
            TokenKind::Semicolon => "';'",
            TokenKind::Slash => "'/'",
        }
    }
}

/// A token with its position in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What the token is.
    pub kind: TokenKind,
    /// Raw text (reassembled for quoted text, body for comments).
    pub lexeme: String,
    /// Position where the token starts.
    pub pos: Position,
}

impl Token {
    /// Create a token.
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, pos: Position) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            pos,
        }
    }

    /// Line the token starts on.
    pub fn line(&self) -> usize {
        self.pos.line
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::QuotedText => write!(f, "text '{}'", self.lexeme),
            TokenKind::TypeName | TokenKind::Identifier => write!(f, "'{}'", self.lexeme),
            TokenKind::EntityId
            | TokenKind::IntegerLiteral
            | TokenKind::RealLiteral
            | TokenKind::EnumLiteral
            | TokenKind::HexLiteral => write!(f, "'{}'", self.lexeme),
            kind => f.write_str(kind.describe()),
        }
    }
}

/// Reserved words of the exchange structure.
///
/// Built once per [`Reader`](crate::Reader) and shared by reference with every
/// lexer it creates.
#[derive(Debug, Clone)]
pub struct KeywordTable {
    words: HashMap<&'static str, TokenKind>,
}

impl KeywordTable {
    /// Table with the Part 21 reserved words.
    pub fn new() -> Self {
        let words = [
            ("ISO-10303-21", TokenKind::FileBegin),
            ("END-ISO-10303-21", TokenKind::FileEnd),
            ("HEADER", TokenKind::SectionStart),
            ("DATA", TokenKind::DataSection),
            ("ENDSEC", TokenKind::SectionEnd),
            ("ENDSCOPE", TokenKind::ScopeEnd),
        ]
        .into_iter()
        .collect();
        Self { words }
    }

    /// Look up an uppercased bare word.
    pub fn get(&self, word: &str) -> Option<TokenKind> {
        self.words.get(word).copied()
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::new()
    }
}
