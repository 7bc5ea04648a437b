//! Lowering errors.

use std::fmt;

use gera_common::{Path, Span};

#[derive(Clone, Debug, PartialEq)]
pub enum LowerError {
    /// The constant evaluator could not fold an expression.
    NotConstant { what: String, span: Span },
    /// A reference the solver never bound to a symbol variant.
    Unresolved { path: Option<Path>, span: Span },
}

impl LowerError {
    pub fn span(&self) -> Span {
        match self {
            LowerError::NotConstant { span, .. } | LowerError::Unresolved { span, .. } => *span,
        }
    }
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LowerError::NotConstant { what, .. } => {
                write!(f, "{} cannot be evaluated at compile time", what)
            }
            LowerError::Unresolved { path: Some(path), .. } => {
                write!(f, "reference to `{}` was never resolved", path)
            }
            LowerError::Unresolved { path: None, .. } => write!(f, "unresolved reference"),
        }
    }
}

impl std::error::Error for LowerError {}
