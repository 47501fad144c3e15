//! Core types shared by the registry operator crates.
//!
//! - [`error`]: typed errors, no panics
//! - [`result`]: `Result` alias and [`ResultExt`] for turning collaborator
//!   failures into absent observations
//! - [`config`]: static [`OperatorConfig`] loaded from TOML
//! - [`telemetry`]: tracing subscriber setup

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod config;
pub mod error;
pub mod result;
pub mod telemetry;

pub use config::OperatorConfig;
pub use error::Error;
pub use result::{Result, ResultExt};
pub use telemetry::init_tracing;
