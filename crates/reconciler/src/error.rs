//! Error types for the reconciler crate.
//!
//! None of these ever escape an observe, decide or act step. They are the
//! currency of the collaborators (cluster client, committer, env renderer).

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A cluster call failed.
    #[error("cluster request '{operation}' failed: {reason}")]
    Cluster { operation: String, reason: String },

    /// The env cache dependency graph has a cycle.
    #[error("env entry '{entry}' is part of a dependency cycle")]
    DependencyCycle { entry: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Core crate error, flattened to its message.
    #[error("core error: {0}")]
    Core(String),
}

impl From<registry_operator_core::Error> for Error {
    fn from(err: registry_operator_core::Error) -> Self {
        Self::Core(err.to_string())
    }
}

impl Error {
    /// Create a cluster error.
    pub fn cluster(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cluster {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a dependency cycle error.
    pub fn dependency_cycle(entry: impl Into<String>) -> Self {
        Self::DependencyCycle {
            entry: entry.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
