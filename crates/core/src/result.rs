//! Result type definition and extension trait for Railway-Oriented Programming.
//!
//! Reconciliation never propagates collaborator failures out of an observe
//! step. [`ResultExt`] is how a failure becomes an absent observation while
//! still leaving a trace in the logs.

use crate::error::Error;

/// The standard Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing safe combinators for any `Result` with a
/// displayable error.
pub trait ResultExt<T> {
    /// Convert a Result to an Option, logging the error if present.
    fn into_option_logged(self) -> Option<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn into_option_logged(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Operation failed, treating as absent");
                None
            }
        }
    }
}
