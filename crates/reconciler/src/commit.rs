//! Turns pending resource cache state into cluster calls.
//!
//! Runs after a pass, never inside one. For each owned key it issues at most
//! one call per commit:
//!
//! - an entry bound to [`EMPTY_NAME`](crate::resource_cache::EMPTY_NAME) is
//!   created from its patched view;
//! - a bound entry with queued patches is updated from its patched view;
//! - anything else is left alone.
//!
//! The cluster's answer replaces the entry, so the next pass finds a real
//! binding with an empty patch queue. A conflicting update drops the entry
//! instead; the next pass re-lists and adopts the object again.

use tracing::{info, warn};

use crate::cluster::{ManagedObject, UpdateOutcome};
use crate::context::Context;
use crate::functions::OwnedResource;
use crate::resource_cache::{DeploymentKey, ResourceCacheEntry, ResourceKey, ServiceKey};

/// What one commit did, per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub created: Vec<ResourceKey>,
    pub updated: Vec<ResourceKey>,
    pub conflicts: Vec<ResourceKey>,
    pub failures: Vec<ResourceKey>,
}

impl CommitReport {
    /// Whether another pass is needed to finish the job.
    pub fn requeue(&self) -> bool {
        !self.conflicts.is_empty() || !self.failures.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.conflicts.is_empty()
            && self.failures.is_empty()
    }
}

/// Commits the deployment and service entries through the context's clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceCommitter;

impl ResourceCommitter {
    pub const fn new() -> Self {
        Self
    }

    pub async fn commit(&self, ctx: &mut Context) -> CommitReport {
        let mut report = CommitReport::default();
        commit_key::<DeploymentKey>(ctx, &mut report).await;
        commit_key::<ServiceKey>(ctx, &mut report).await;
        if !report.is_empty() {
            info!(
                created = report.created.len(),
                updated = report.updated.len(),
                conflicts = report.conflicts.len(),
                failures = report.failures.len(),
                "Committed resource cache"
            );
        }
        report
    }
}

async fn commit_key<K: OwnedResource>(ctx: &mut Context, report: &mut CommitReport) {
    let Some(entry) = ctx.resources().get::<K>().cloned() else {
        return;
    };
    if entry.is_materialized() && !entry.has_pending_patches() {
        return;
    }

    let api = K::api(ctx);
    let desired = entry.current();

    if !entry.is_materialized() {
        match api.create(desired.as_ref()).await {
            Ok(created) if !created.object_name().is_empty() => {
                let name = created.object_name().to_string();
                info!(key = %K::KEY, name = %name, "Created object");
                ctx.status_mut().set(K::STATUS_KEY, name.clone());
                ctx.resources_mut()
                    .set::<K>(ResourceCacheEntry::new(name, created));
                report.created.push(K::KEY);
            }
            Ok(_) => {
                warn!(key = %K::KEY, "Created object has no name");
                report.failures.push(K::KEY);
            }
            Err(e) => {
                warn!(key = %K::KEY, error = %e, "Create failed, keeping pending entry");
                report.failures.push(K::KEY);
            }
        }
        return;
    }

    match api.update(entry.name(), desired.as_ref()).await {
        Ok(UpdateOutcome::Updated(updated)) => {
            info!(key = %K::KEY, name = entry.name(), "Updated object");
            ctx.resources_mut()
                .set::<K>(ResourceCacheEntry::new(entry.name(), updated));
            report.updated.push(K::KEY);
        }
        Ok(UpdateOutcome::Conflict) => {
            warn!(key = %K::KEY, name = entry.name(), "Update conflict, dropping cached entry");
            ctx.resources_mut().remove::<K>();
            report.conflicts.push(K::KEY);
        }
        Err(e) => {
            warn!(key = %K::KEY, name = entry.name(), error = %e, "Update failed, keeping entry");
            report.failures.push(K::KEY);
        }
    }
}
