//! Middle-end errors
//!
//! Only the initialization analysis produces user-facing errors; everything
//! else the middle-end could complain about is a compiler bug and panics.

use thiserror::Error;
use vela_ir::Span;

/// An error found by the middle-end analyses, reported to the user
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    /// A variable may be read on some path before any write to it
    #[error("variable '{name}' is used before being initialized")]
    UseBeforeInit {
        /// Source name of the variable
        name: String,
        /// The offending read
        loc: Span,
    },

    /// A function with return values may fall off its end without setting them
    #[error("control reaches end of function with non-empty return type")]
    MissingReturn {
        /// The function declaration
        loc: Span,
    },
}

impl AnalysisError {
    /// The source location the error points at
    pub fn loc(&self) -> Span {
        match self {
            AnalysisError::UseBeforeInit { loc, .. } => *loc,
            AnalysisError::MissingReturn { loc } => *loc,
        }
    }
}
