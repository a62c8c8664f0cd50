//! Error types for reader operations.
//!
//! Only failures that prevent reading at all are errors. Problems with the
//! file content are reported as [`Diagnostic`](crate::Diagnostic)s.

use thiserror::Error;

/// Errors that can occur before or while fetching input.
#[derive(Error, Debug)]
pub enum ReadError {
    /// I/O error reading a file or stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Options file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Options are out of range.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

/// Result type for reader operations.
pub type Result<T> = std::result::Result<T, ReadError>;

/// Errors from typed argument access on an [`Entity`](crate::Entity).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgError {
    /// Fewer arguments than requested.
    #[error("entity #{id} has no argument {index}")]
    Missing {
        /// Entity id.
        id: u64,
        /// Argument index.
        index: usize,
    },

    /// Argument has a different type.
    #[error("entity #{id} ({type_name}): expected {expected} at argument {index}")]
    TypeMismatch {
        /// Entity id.
        id: u64,
        /// Argument index.
        index: usize,
        /// What the caller asked for.
        expected: &'static str,
        /// Type name of the entity.
        type_name: String,
    },
}
