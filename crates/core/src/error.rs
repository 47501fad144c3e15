//! Core error types for operator startup and configuration.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for operator operations.
#[derive(Debug, Error)]
pub enum Error {
    // I/O errors
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    // Parsing errors
    #[error("TOML parse error: {reason}")]
    TomlParseFailed { reason: String },

    // Configuration errors
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to initialise tracing: {reason}")]
    TracingInitFailed { reason: String },
}

impl Error {
    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a TOML parse error.
    pub fn toml_parse_failed(reason: impl Into<String>) -> Self {
        Self::TomlParseFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a tracing initialisation error.
    pub fn tracing_init_failed(reason: impl Into<String>) -> Self {
        Self::TracingInitFailed {
            reason: reason.into(),
        }
    }
}
