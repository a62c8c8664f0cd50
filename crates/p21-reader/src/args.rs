//! Typed, index-based access to entity arguments.
//!
//! Schema-specific code downstream of the reader knows which argument holds
//! what; this trait turns "argument 2 should be a list of references" into a
//! one-liner with a useful error.

use crate::error::ArgError;
use crate::model::{Entity, Parameter};

/// Helper trait for extracting argument values from entities.
pub trait EntityArgs {
    /// Get arguments slice.
    fn args(&self) -> &[Parameter];

    /// Get a required real argument at index (integers are accepted).
    fn real(&self, idx: usize) -> Result<f64, ArgError>;

    /// Get a required integer argument at index.
    fn integer(&self, idx: usize) -> Result<i64, ArgError>;

    /// Get a required text argument at index.
    fn text(&self, idx: usize) -> Result<&str, ArgError>;

    /// Get a required enum argument at index.
    fn enumeration(&self, idx: usize) -> Result<&str, ArgError>;

    /// Get a required entity reference at index.
    fn reference(&self, idx: usize) -> Result<u64, ArgError>;

    /// Get a required list argument at index.
    fn list(&self, idx: usize) -> Result<&[Parameter], ArgError>;

    /// Get a list of reals at index.
    fn real_list(&self, idx: usize) -> Result<Vec<f64>, ArgError>;

    /// Get a list of entity references at index.
    fn reference_list(&self, idx: usize) -> Result<Vec<u64>, ArgError>;

    /// Check if argument at index is `$` (or missing).
    fn is_void(&self, idx: usize) -> bool;
}

impl Entity {
    fn arg<'a, T>(
        &'a self,
        idx: usize,
        expected: &'static str,
        get: impl FnOnce(&'a Parameter) -> Option<T>,
    ) -> Result<T, ArgError> {
        let value = self.parameters.get(idx).ok_or(ArgError::Missing { id: self.id, index: idx })?;
        get(value).ok_or_else(|| self.mismatch(idx, expected))
    }

    fn mismatch(&self, idx: usize, expected: &'static str) -> ArgError {
        ArgError::TypeMismatch {
            id: self.id,
            index: idx,
            expected,
            type_name: self.type_name().to_string(),
        }
    }
}

impl EntityArgs for Entity {
    fn args(&self) -> &[Parameter] {
        &self.parameters
    }

    fn real(&self, idx: usize) -> Result<f64, ArgError> {
        self.arg(idx, "real", Parameter::as_real)
    }

    fn integer(&self, idx: usize) -> Result<i64, ArgError> {
        self.arg(idx, "integer", Parameter::as_integer)
    }

    fn text(&self, idx: usize) -> Result<&str, ArgError> {
        self.arg(idx, "text", Parameter::as_text)
    }

    fn enumeration(&self, idx: usize) -> Result<&str, ArgError> {
        self.arg(idx, "enumeration", Parameter::as_enum)
    }

    fn reference(&self, idx: usize) -> Result<u64, ArgError> {
        self.arg(idx, "entity reference", Parameter::as_reference)
    }

    fn list(&self, idx: usize) -> Result<&[Parameter], ArgError> {
        self.arg(idx, "list", Parameter::as_list)
    }

    fn real_list(&self, idx: usize) -> Result<Vec<f64>, ArgError> {
        let list = self.list(idx)?;
        list.iter()
            .map(|v| v.as_real().ok_or_else(|| self.mismatch(idx, "list of reals")))
            .collect()
    }

    fn reference_list(&self, idx: usize) -> Result<Vec<u64>, ArgError> {
        let list = self.list(idx)?;
        list.iter()
            .map(|v| {
                v.as_reference()
                    .ok_or_else(|| self.mismatch(idx, "list of entity references"))
            })
            .collect()
    }

    fn is_void(&self, idx: usize) -> bool {
        self.parameters.get(idx).map(|v| v.is_void()).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn curve() -> Entity {
        Entity {
            id: 1,
            type_names: vec!["B_SPLINE_CURVE_WITH_KNOTS".into()],
            parameters: vec![
                Parameter::Text(String::new()),
                Parameter::Integer(3),
                Parameter::List(vec![
                    Parameter::reference(2),
                    Parameter::reference(3),
                    Parameter::reference(4),
                ]),
                Parameter::Enum("UNSPECIFIED".into()),
                Parameter::List(vec![Parameter::Real(0.0), Parameter::Integer(1)]),
                Parameter::Void,
            ],
            line: 1,
            order: 0,
            section: 0,
            scope: None,
        }
    }

    #[test]
    fn test_typed_access() {
        let e = curve();
        assert_eq!(e.text(0).unwrap(), "");
        assert_eq!(e.integer(1).unwrap(), 3);
        assert_relative_eq!(e.real(1).unwrap(), 3.0);
        assert_eq!(e.reference_list(2).unwrap(), vec![2, 3, 4]);
        assert_eq!(e.enumeration(3).unwrap(), "UNSPECIFIED");
        assert_eq!(e.real_list(4).unwrap(), vec![0.0, 1.0]);
        assert!(e.is_void(5));
        assert!(e.is_void(6));
        assert!(!e.is_void(0));
        assert_eq!(e.args().len(), 6);
    }

    #[test]
    fn test_errors_name_entity_and_index() {
        let e = curve();
        assert_eq!(e.reference(7), Err(ArgError::Missing { id: 1, index: 7 }));
        let err = e.real(0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "entity #1 (B_SPLINE_CURVE_WITH_KNOTS): expected real at argument 0"
        );
        assert!(matches!(
            e.real_list(2),
            Err(ArgError::TypeMismatch { index: 2, .. })
        ));
    }
}
