//! Cluster collaborator interface and an in-memory implementation.
//!
//! The engine never calls the cluster from decide or act. Observe steps list
//! candidates through [`ClusterApi::list`]; the committer is the only caller
//! of `create` and `update`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use itertools::Itertools;
use k8s_openapi::Metadata;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// A namespaced cluster object the engine can track.
pub trait ManagedObject:
    Metadata<Ty = ObjectMeta> + Clone + fmt::Debug + Send + Sync + 'static
{
    /// Object name, empty when not yet assigned.
    fn object_name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Whether deletion of the object has started.
    fn is_terminating(&self) -> bool {
        self.metadata().deletion_timestamp.is_some()
    }
}

impl<T> ManagedObject for T where
    T: Metadata<Ty = ObjectMeta> + Clone + fmt::Debug + Send + Sync + 'static
{
}

/// Equality-based label selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    labels: BTreeMap<String, String>,
}

impl Selector {
    pub fn label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::default().and(key, value)
    }

    #[must_use]
    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Whether every selector label is present on `meta` with the same value.
    pub fn matches(&self, meta: &ObjectMeta) -> bool {
        self.labels.iter().all(|(key, value)| {
            meta.labels
                .as_ref()
                .and_then(|labels| labels.get(key))
                .is_some_and(|actual| actual == value)
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let query = self
            .labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .join(",");
        f.write_str(&query)
    }
}

/// Result of an optimistic-concurrency update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<T> {
    Updated(T),
    /// The object changed since the snapshot was read.
    Conflict,
}

/// Typed access to one kind of cluster object.
#[async_trait]
pub trait ClusterApi<T>: Send + Sync {
    /// List objects in `namespace` matching `selector`, including ones being
    /// deleted.
    async fn list(&self, namespace: &str, selector: &Selector) -> Result<Vec<T>>;

    /// Create `object`; the returned value carries the assigned name.
    async fn create(&self, object: &T) -> Result<T>;

    /// Replace the object called `name` with `object`.
    async fn update(&self, name: &str, object: &T) -> Result<UpdateOutcome<T>>;
}

/// Per-kind clients handed to control functions and the committer.
#[derive(Clone)]
pub struct Clients {
    pub deployments: Arc<dyn ClusterApi<Deployment>>,
    pub services: Arc<dyn ClusterApi<Service>>,
}

impl Clients {
    pub fn new(
        deployments: Arc<dyn ClusterApi<Deployment>>,
        services: Arc<dyn ClusterApi<Service>>,
    ) -> Self {
        Self {
            deployments,
            services,
        }
    }
}

/// In-memory cluster for one object kind.
///
/// Tracks resource versions so stale updates conflict, assigns names from
/// `generateName`, counts create calls and can be told to fail list calls.
pub struct InMemoryClusterApi<T> {
    objects: RwLock<Vec<T>>,
    failing_lists: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
    next_suffix: AtomicUsize,
}

impl<T> Default for InMemoryClusterApi<T> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(Vec::new()),
            failing_lists: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            next_suffix: AtomicUsize::new(1),
        }
    }
}

impl<T: ManagedObject> InMemoryClusterApi<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add an object as if another actor had created it.
    pub async fn insert(&self, mut object: T) {
        object
            .metadata_mut()
            .resource_version
            .get_or_insert_with(|| "1".to_string());
        let name = object.object_name().to_string();
        let mut objects = self.objects.write().await;
        objects.retain(|existing| existing.object_name() != name);
        objects.push(object);
    }

    pub async fn remove(&self, name: &str) -> Option<T> {
        let mut objects = self.objects.write().await;
        let position = objects.iter().position(|o| o.object_name() == name)?;
        Some(objects.remove(position))
    }

    pub async fn get(&self, name: &str) -> Option<T> {
        self.objects
            .read()
            .await
            .iter()
            .find(|o| o.object_name() == name)
            .cloned()
    }

    /// Set the deletion timestamp, as the API server does on delete.
    pub async fn mark_terminating(&self, name: &str) -> bool {
        let mut objects = self.objects.write().await;
        objects
            .iter_mut()
            .find(|o| o.object_name() == name)
            .map(|o| o.metadata_mut().deletion_timestamp = Some(Time(Utc::now())))
            .is_some()
    }

    /// Bump the resource version, as a concurrent writer would.
    pub async fn touch(&self, name: &str) -> bool {
        let mut objects = self.objects.write().await;
        objects
            .iter_mut()
            .find(|o| o.object_name() == name)
            .map(|o| bump_version(o.metadata_mut()))
            .is_some()
    }

    /// Make the next `count` list calls fail.
    pub fn fail_next_lists(&self, count: usize) {
        self.failing_lists.store(count, Ordering::SeqCst);
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

fn bump_version(meta: &mut ObjectMeta) {
    let next = meta
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        .saturating_add(1);
    meta.resource_version = Some(next.to_string());
}

#[async_trait]
impl<T: ManagedObject> ClusterApi<T> for InMemoryClusterApi<T> {
    async fn list(&self, namespace: &str, selector: &Selector) -> Result<Vec<T>> {
        let failing = self
            .failing_lists
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::cluster("list", "injected failure"));
        }

        Ok(self
            .objects
            .read()
            .await
            .iter()
            .filter(|o| o.metadata().namespace.as_deref() == Some(namespace))
            .filter(|o| selector.matches(o.metadata()))
            .cloned()
            .collect())
    }

    async fn create(&self, object: &T) -> Result<T> {
        let mut created = object.clone();
        if created.object_name().is_empty() {
            let prefix = created.metadata().generate_name.clone().unwrap_or_default();
            let suffix = self.next_suffix.fetch_add(1, Ordering::SeqCst);
            created.metadata_mut().name = Some(format!("{prefix}{suffix:05}"));
        }
        let name = created.object_name().to_string();

        let mut objects = self.objects.write().await;
        if objects.iter().any(|o| o.object_name() == name) {
            return Err(Error::cluster("create", format!("'{name}' already exists")));
        }
        created.metadata_mut().resource_version = Some("1".to_string());
        objects.push(created.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn update(&self, name: &str, object: &T) -> Result<UpdateOutcome<T>> {
        let mut objects = self.objects.write().await;
        let Some(stored) = objects.iter_mut().find(|o| o.object_name() == name) else {
            return Err(Error::cluster("update", format!("'{name}' not found")));
        };
        if stored.metadata().resource_version != object.metadata().resource_version {
            return Ok(UpdateOutcome::Conflict);
        }

        let mut updated = object.clone();
        updated.metadata_mut().resource_version = stored.metadata().resource_version.clone();
        bump_version(updated.metadata_mut());
        *stored = updated.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(UpdateOutcome::Updated(updated))
    }
}

/// In-memory deployments and services sharing one lifetime.
#[derive(Clone, Default)]
pub struct InMemoryCluster {
    pub deployments: Arc<InMemoryClusterApi<Deployment>>,
    pub services: Arc<InMemoryClusterApi<Service>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clients(&self) -> Clients {
        Clients::new(self.deployments.clone(), self.services.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(name: &str, namespace: &str, app: &str) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
                ..ObjectMeta::default()
            },
            ..Deployment::default()
        }
    }

    #[test]
    fn test_selector_display() {
        let selector = Selector::label("app", "registry").and("tier", "backend");
        assert_eq!(selector.to_string(), "app=registry,tier=backend");
    }

    #[test]
    fn test_selector_requires_all_labels() {
        let selector = Selector::label("app", "registry").and("tier", "backend");
        let meta = deployment("a", "ns", "registry").metadata;
        assert!(!selector.matches(&meta));
        assert!(Selector::label("app", "registry").matches(&meta));
    }

    #[tokio::test]
    async fn test_list_filters_namespace_and_labels() {
        let api = InMemoryClusterApi::new();
        api.insert(deployment("a", "ns", "registry")).await;
        api.insert(deployment("b", "other", "registry")).await;
        api.insert(deployment("c", "ns", "something-else")).await;

        let listed = api.list("ns", &Selector::label("app", "registry")).await;
        let names: Vec<String> = listed
            .unwrap_or_default()
            .iter()
            .map(|d| d.object_name().to_string())
            .collect();
        assert_eq!(names, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_list_failure_is_consumed() {
        let api: InMemoryClusterApi<Deployment> = InMemoryClusterApi::new();
        api.fail_next_lists(1);
        let selector = Selector::label("app", "registry");

        assert!(api.list("ns", &selector).await.is_err());
        assert!(api.list("ns", &selector).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_assigns_generated_name() {
        let api = InMemoryClusterApi::new();
        let mut template = deployment("", "ns", "registry");
        template.metadata.name = None;
        template.metadata.generate_name = Some("registry-deployment-".to_string());

        let created = api.create(&template).await;
        assert_eq!(
            created.ok().map(|d| d.object_name().to_string()),
            Some("registry-deployment-00001".to_string())
        );
        assert_eq!(api.create_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let api = InMemoryClusterApi::new();
        api.insert(deployment("a", "ns", "registry")).await;
        let snapshot = api.get("a").await.unwrap_or_default();
        assert!(api.touch("a").await);

        let outcome = api.update("a", &snapshot).await;
        assert_eq!(outcome, Ok(UpdateOutcome::Conflict));
        assert_eq!(api.update_count(), 0);
    }

    #[tokio::test]
    async fn test_fresh_update_bumps_version() {
        let api = InMemoryClusterApi::new();
        api.insert(deployment("a", "ns", "registry")).await;
        let snapshot = api.get("a").await.unwrap_or_default();

        let outcome = api.update("a", &snapshot).await;
        let version = match outcome {
            Ok(UpdateOutcome::Updated(updated)) => updated.metadata.resource_version,
            _ => None,
        };
        assert_eq!(version, Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_mark_terminating_sets_deletion_timestamp() {
        let api = InMemoryClusterApi::new();
        api.insert(deployment("a", "ns", "registry")).await;

        assert!(api.mark_terminating("a").await);
        assert!(!api.mark_terminating("missing").await);

        let terminating = api.get("a").await.map(|d| d.is_terminating());
        assert_eq!(terminating, Some(true));
    }
}
