//! Non-fatal problems found while reading a file.
//!
//! Content problems are never returned as `Err`; they are collected as
//! [`Diagnostic`]s next to the (possibly partial) graph so the caller can
//! decide whether to salvage the data or reject the file.

use crate::position::Position;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// How bad a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Recovered without losing data.
    Warning,
    /// Data was rejected or the structure is invalid.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// What went wrong. The `Display` impl is the human-readable message.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Bytes that cannot start any token.
    #[error("skipped unrecognized input {text:?}")]
    StrayInput {
        /// The skipped bytes, lossily decoded.
        text: String,
    },

    /// `/*` without a matching `*/`.
    #[error("unterminated comment")]
    UnterminatedComment,

    /// Quoted text still open at end of input.
    #[error("unterminated text literal")]
    UnterminatedText,

    /// A quote followed by whitespace and then something other than a delimiter.
    #[error("ambiguous end of text literal; closed at the quote")]
    AmbiguousQuote,

    /// A single quote inside text that is not doubled.
    #[error("unescaped quote inside text literal kept as content")]
    UnescapedQuote,

    /// A number that does not fit the target type.
    #[error("invalid number {lexeme:?}: {reason}")]
    InvalidNumber {
        /// Raw lexeme.
        lexeme: String,
        /// What was done about it.
        reason: String,
    },

    /// `#` not followed by a valid id.
    #[error("invalid entity id {lexeme:?}")]
    InvalidEntityId {
        /// Raw lexeme.
        lexeme: String,
    },

    /// `"` hex literal with non-hex content or missing closing `"`.
    #[error("invalid binary literal {lexeme:?}")]
    InvalidBinary {
        /// Raw lexeme.
        lexeme: String,
    },

    /// Malformed `\X2\` / `\X4\` / `\X\` sequence inside text.
    #[error("invalid control directive in text: {directive:?}")]
    InvalidControlDirective {
        /// The offending directive.
        directive: String,
    },

    /// The grammar expected something else.
    #[error("{}expected {expected}, found {found}", entity.map(|id| format!("in entity #{id}: ")).unwrap_or_default())]
    UnexpectedToken {
        /// Entity being parsed, if any.
        entity: Option<u64>,
        /// What the grammar wanted.
        expected: String,
        /// What was there instead.
        found: String,
    },

    /// Input ended inside a section.
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof {
        /// What the grammar wanted.
        expected: String,
    },

    /// Lists nested deeper than the configured limit.
    #[error("{}lists nested deeper than {limit} levels", entity.map(|id| format!("in entity #{id}: ")).unwrap_or_default())]
    NestingTooDeep {
        /// Entity being parsed, if any.
        entity: Option<u64>,
        /// Configured limit.
        limit: usize,
    },

    /// Grammar error budget exhausted.
    #[error("too many errors ({limit}), giving up")]
    TooManyErrors {
        /// Configured limit.
        limit: usize,
    },

    /// Second definition of an id.
    #[error("duplicate entity #{id} (first defined on line {first_line}); definition ignored")]
    DuplicateId {
        /// The repeated id.
        id: u64,
        /// Line of the definition that was kept.
        first_line: usize,
    },

    /// Reference to an id that is never defined.
    #[error("entity #{from} references undefined entity #{to}")]
    DanglingReference {
        /// Referencing entity.
        from: u64,
        /// Missing target.
        to: u64,
    },

    /// Reference into a scope the referencing entity cannot see.
    #[error("entity #{from} references #{to}, which is local to a scope and not exported")]
    HiddenReference {
        /// Referencing entity.
        from: u64,
        /// Scoped target.
        to: u64,
    },

    /// Export list names an id that is not part of the scope.
    #[error("scope exports #{id}, which is not defined in that scope")]
    UnknownExport {
        /// Exported id.
        id: u64,
    },

    /// Build events arrived in an order the builder cannot accept.
    #[error("malformed build sequence: {detail}")]
    Protocol {
        /// What was out of order.
        detail: String,
    },
}

impl DiagnosticKind {
    /// Severity implied by the kind.
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::StrayInput { .. }
            | DiagnosticKind::UnterminatedComment
            | DiagnosticKind::UnterminatedText
            | DiagnosticKind::AmbiguousQuote
            | DiagnosticKind::UnescapedQuote
            | DiagnosticKind::InvalidControlDirective { .. }
            | DiagnosticKind::HiddenReference { .. }
            | DiagnosticKind::UnknownExport { .. }
            | DiagnosticKind::InvalidNumber { .. } => Severity::Warning,
            DiagnosticKind::InvalidEntityId { .. }
            | DiagnosticKind::InvalidBinary { .. }
            | DiagnosticKind::UnexpectedToken { .. }
            | DiagnosticKind::UnexpectedEof { .. }
            | DiagnosticKind::NestingTooDeep { .. }
            | DiagnosticKind::TooManyErrors { .. }
            | DiagnosticKind::DuplicateId { .. }
            | DiagnosticKind::DanglingReference { .. }
            | DiagnosticKind::Protocol { .. } => Severity::Error,
        }
    }

    /// Whether the problem is about cross-references rather than file structure.
    pub fn is_reference_problem(&self) -> bool {
        matches!(
            self,
            DiagnosticKind::DanglingReference { .. } | DiagnosticKind::HiddenReference { .. }
        )
    }
}

/// A located [`DiagnosticKind`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Where the problem was detected.
    pub pos: Position,
    /// What the problem is.
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(pos: Position, kind: DiagnosticKind) -> Self {
        Self { pos, kind }
    }

    /// Line number (1-indexed).
    pub fn line(&self) -> usize {
        self.pos.line
    }

    /// Severity implied by the kind.
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    /// Human-readable message.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// Whether this is an error-severity diagnostic.
    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.pos, self.severity(), self.kind)
    }
}

/// True when any error-severity diagnostic concerns the file structure.
///
/// Dangling references are reported as errors but do not by themselves make a
/// file structurally invalid.
pub fn has_structural_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics
        .iter()
        .any(|d| d.is_error() && !d.kind.is_reference_problem())
}
