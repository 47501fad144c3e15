//! Resource cache: last-known snapshots of externally owned objects.
//!
//! The cache holds at most one entry per well-known [`ResourceKey`]. Each key
//! is a marker type implementing [`CacheKey`], which fixes the payload type at
//! compile time, so `cache.get::<DeploymentKey>()` can only ever yield a
//! [`Deployment`].
//!
//! Entries are copy-on-write. The stored snapshot sits behind an [`Arc`] and
//! is never mutated; a patch is a `&T -> T` transform appended to the entry's
//! queue. [`ResourceCacheEntry::current`] folds the queue over the snapshot
//! to produce the patched view, and the committer does the same when it
//! turns the entry into a create or update call.

use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use tracing::debug;

use crate::types::Registry;

/// Binding name of an entry that is assigned to its key but not yet created.
pub const EMPTY_NAME: &str = "";

/// Well-known roles the cache tracks, one entry each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    /// The desired-state custom resource.
    Spec,
    /// The application's deployment.
    Deployment,
    /// The application's service.
    Service,
}

impl ResourceKey {
    /// Stable name used in logs and status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spec => "spec",
            Self::Deployment => "deployment",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A copy-on-write transform from one snapshot to the next.
pub type Transform<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

/// One cached object: binding name, immutable snapshot, pending transforms.
pub struct ResourceCacheEntry<T> {
    name: String,
    value: Arc<T>,
    patches: Vec<Transform<T>>,
}

impl<T> ResourceCacheEntry<T> {
    /// Bind `value` under the real object name `name`.
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value: Arc::new(value),
            patches: Vec::new(),
        }
    }

    /// An entry awaiting creation, bound to [`EMPTY_NAME`].
    pub fn pending(value: T) -> Self {
        Self::new(EMPTY_NAME, value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the entry is bound to a real object.
    pub fn is_materialized(&self) -> bool {
        self.name != EMPTY_NAME
    }

    /// The stored snapshot, without pending transforms.
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// Queue a transform. Queued transforms run in append order.
    pub fn apply_patch<F>(&mut self, transform: F)
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.patches.push(Arc::new(transform));
    }

    pub fn pending_patches(&self) -> usize {
        self.patches.len()
    }

    pub fn has_pending_patches(&self) -> bool {
        !self.patches.is_empty()
    }

    /// The snapshot with every queued transform applied.
    ///
    /// Each transform reads the previous result and returns a new value, so
    /// neither the stored snapshot nor any `Arc` handed out earlier changes.
    pub fn current(&self) -> Arc<T> {
        self.patches
            .iter()
            .fold(Arc::clone(&self.value), |snapshot, transform| {
                Arc::new((**transform)(snapshot.as_ref()))
            })
    }
}

impl<T> Clone for ResourceCacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            value: Arc::clone(&self.value),
            patches: self.patches.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ResourceCacheEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCacheEntry")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("pending_patches", &self.patches.len())
            .finish()
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Marker type for one well-known cache key and its payload type.
///
/// Sealed: the key vocabulary is closed.
pub trait CacheKey: sealed::Sealed + Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    const KEY: ResourceKey;

    #[doc(hidden)]
    fn slot(cache: &ResourceCache) -> Option<&ResourceCacheEntry<Self::Value>>;

    #[doc(hidden)]
    fn slot_mut(cache: &mut ResourceCache) -> &mut Option<ResourceCacheEntry<Self::Value>>;
}

/// Key of the desired-state custom resource.
#[derive(Debug, Clone, Copy)]
pub struct SpecKey;

/// Key of the application's deployment.
#[derive(Debug, Clone, Copy)]
pub struct DeploymentKey;

/// Key of the application's service.
#[derive(Debug, Clone, Copy)]
pub struct ServiceKey;

impl sealed::Sealed for SpecKey {}
impl sealed::Sealed for DeploymentKey {}
impl sealed::Sealed for ServiceKey {}

impl CacheKey for SpecKey {
    type Value = Registry;
    const KEY: ResourceKey = ResourceKey::Spec;

    fn slot(cache: &ResourceCache) -> Option<&ResourceCacheEntry<Registry>> {
        cache.spec.as_ref()
    }

    fn slot_mut(cache: &mut ResourceCache) -> &mut Option<ResourceCacheEntry<Registry>> {
        &mut cache.spec
    }
}

impl CacheKey for DeploymentKey {
    type Value = Deployment;
    const KEY: ResourceKey = ResourceKey::Deployment;

    fn slot(cache: &ResourceCache) -> Option<&ResourceCacheEntry<Deployment>> {
        cache.deployment.as_ref()
    }

    fn slot_mut(cache: &mut ResourceCache) -> &mut Option<ResourceCacheEntry<Deployment>> {
        &mut cache.deployment
    }
}

impl CacheKey for ServiceKey {
    type Value = Service;
    const KEY: ResourceKey = ResourceKey::Service;

    fn slot(cache: &ResourceCache) -> Option<&ResourceCacheEntry<Service>> {
        cache.service.as_ref()
    }

    fn slot_mut(cache: &mut ResourceCache) -> &mut Option<ResourceCacheEntry<Service>> {
        &mut cache.service
    }
}

/// Store of cached objects, one optional entry per [`ResourceKey`].
///
/// `generation` counts mutations (set, remove, patch). Reconciliation is
/// idempotent exactly when a pass leaves it unchanged.
#[derive(Debug, Default)]
pub struct ResourceCache {
    spec: Option<ResourceCacheEntry<Registry>>,
    deployment: Option<ResourceCacheEntry<Deployment>>,
    service: Option<ResourceCacheEntry<Service>>,
    generation: u64,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<K: CacheKey>(&self) -> Option<&ResourceCacheEntry<K::Value>> {
        K::slot(self)
    }

    pub fn contains<K: CacheKey>(&self) -> bool {
        K::slot(self).is_some()
    }

    /// Store `entry` under `K`, replacing any previous entry.
    pub fn set<K: CacheKey>(&mut self, entry: ResourceCacheEntry<K::Value>) {
        debug!(key = %K::KEY, name = entry.name(), "Setting resource cache entry");
        *K::slot_mut(self) = Some(entry);
        self.bump();
    }

    pub fn remove<K: CacheKey>(&mut self) -> Option<ResourceCacheEntry<K::Value>> {
        let removed = K::slot_mut(self).take();
        if removed.is_some() {
            debug!(key = %K::KEY, "Removed resource cache entry");
            self.bump();
        }
        removed
    }

    /// Queue `transform` on the entry under `K`.
    ///
    /// Returns `false`, queueing nothing, when the key has no entry.
    pub fn apply_patch<K, F>(&mut self, transform: F) -> bool
    where
        K: CacheKey,
        F: Fn(&K::Value) -> K::Value + Send + Sync + 'static,
    {
        let Some(entry) = K::slot_mut(self).as_mut() else {
            debug!(key = %K::KEY, "No entry to patch");
            return false;
        };
        entry.apply_patch(transform);
        debug!(
            key = %K::KEY,
            pending = entry.pending_patches(),
            "Queued resource patch"
        );
        self.bump();
        true
    }

    /// Keys that currently hold an entry, in key order.
    pub fn keys(&self) -> Vec<ResourceKey> {
        [
            self.spec.as_ref().map(|_| ResourceKey::Spec),
            self.deployment.as_ref().map(|_| ResourceKey::Deployment),
            self.service.as_ref().map(|_| ResourceKey::Service),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    const fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}
