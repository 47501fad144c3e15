//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::Error;
use crate::result::Result;

/// Install the global subscriber: `RUST_LOG` filtering, `info` by default.
///
/// # Errors
///
/// Returns [`Error::TracingInitFailed`] when a global subscriber is already
/// installed.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::tracing_init_failed(e.to_string()))
}
