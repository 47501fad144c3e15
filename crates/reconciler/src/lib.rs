//! Reconciliation core for the registry operator.
//!
//! A [`Reconciler`] owns one managed application's [`Context`] and an
//! ordered list of [`ControlFunction`]s. Each pass:
//!
//! 1. stores the desired [`Registry`] spec in the resource cache,
//! 2. runs every control function's observe, decide and act in
//!    registration order,
//! 3. reads and clears the requeue flag.
//!
//! Control functions never call the cluster to change anything. They write
//! to two caches that outlive the pass:
//!
//! - the [`ResourceCache`] holds the bound deployment and service with a
//!   queue of copy-on-write patches;
//! - the [`EnvCache`] holds the application's env entries and the
//!   `$(NAME)` references between them.
//!
//! The [`ResourceCommitter`] then turns pending entries into create and
//! update calls. Because bindings survive between passes, a second pass
//! against an unchanged cluster does nothing.
//!
//! # Example
//!
//! ```ignore
//! use registry_operator_reconciler::{
//!     InMemoryCluster, ReconcilerBuilder, Registry, ResourceCommitter,
//! };
//!
//! #[tokio::main]
//! async fn main() -> registry_operator_reconciler::Result<()> {
//!     let cluster = InMemoryCluster::new();
//!     let mut reconciler = ReconcilerBuilder::new()
//!         .with_clients(cluster.clients())
//!         .with_default_control_functions()
//!         .build()?;
//!
//!     let outcome = reconciler
//!         .reconcile(Registry::new("registry", "kafka"), &ResourceCommitter::new())
//!         .await;
//!     assert!(outcome.requeue_after.is_none());
//!     Ok(())
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod cluster;
pub mod commit;
pub mod context;
pub mod control;
pub mod env_cache;
pub mod error;
pub mod factory;
pub mod functions;
pub mod reconciler;
pub mod resource_cache;
pub mod types;

pub use cluster::{
    Clients, ClusterApi, InMemoryCluster, InMemoryClusterApi, ManagedObject, Selector,
    UpdateOutcome,
};
pub use commit::{CommitReport, ResourceCommitter};
pub use context::{AppIdentity, Context, Status};
pub use control::ControlFunction;
pub use env_cache::{EnvCache, EnvCacheEntry, EnvValue};
pub use error::{Error, Result};
pub use factory::{DefaultObjectFactory, ObjectFactory};
pub use functions::default_control_functions;
pub use reconciler::{PassReport, ReconcileOutcome, Reconciler, ReconcilerBuilder};
pub use resource_cache::{
    CacheKey, DeploymentKey, EMPTY_NAME, ResourceCache, ResourceCacheEntry, ResourceKey,
    ServiceKey, SpecKey,
};
pub use types::Registry;
