//! Reader configuration.

use crate::error::{ReadError, Result};
use serde::{Deserialize, Serialize};

/// Options controlling how a file is read.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// max_errors = 50
/// decode_text = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderOptions {
    /// Decode `\X2\...\X0\` and the other text control directives.
    pub decode_text: bool,
    /// Stop parsing after this many grammar errors.
    pub max_errors: Option<usize>,
    /// Warn about references into scopes that do not export the target.
    pub check_scope_visibility: bool,
    /// Deepest parenthesis nesting accepted inside a record.
    pub max_nesting: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            decode_text: true,
            max_errors: None,
            check_scope_visibility: true,
            max_nesting: 256,
        }
    }
}

impl ReaderOptions {
    /// Validate options.
    pub fn validate(&self) -> Result<()> {
        if self.max_errors == Some(0) {
            return Err(ReadError::InvalidOptions(
                "max_errors must be at least 1".into(),
            ));
        }
        if self.max_nesting == 0 {
            return Err(ReadError::InvalidOptions(
                "max_nesting must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate options from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: Self = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }
}
