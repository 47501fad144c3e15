//! Single-owner discovery for the deployment and service keys.
//!
//! Each pass re-validates the cached binding against the live candidates
//! (objects labelled for the application, in its namespace, not being
//! deleted):
//!
//! 1. A binding that is still listed, or an entry waiting for creation,
//!    needs nothing.
//! 2. A binding whose object is no longer listed is invalidated.
//! 3. With no binding left, exactly one candidate is adopted as-is. Zero or
//!    several candidates leave a factory default bound to [`EMPTY_NAME`],
//!    which the committer creates.
//!
//! A failed listing is no observation at all: existing bindings are kept,
//! nothing is selected and the pass requeues.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use registry_operator_core::ResultExt;
use tracing::{debug, info};

use crate::cluster::{ClusterApi, ManagedObject};
use crate::context::{Context, STATUS_DEPLOYMENT_NAME, STATUS_SERVICE_NAME};
use crate::control::ControlFunction;
use crate::resource_cache::{CacheKey, DeploymentKey, EMPTY_NAME, ResourceCacheEntry, ServiceKey};

/// A cache key whose object the operator owns in the cluster.
pub trait OwnedResource: CacheKey<Value: ManagedObject> {
    /// Name reported by the discovery control function.
    const NAME: &'static str;

    /// Status key recording the bound object name.
    const STATUS_KEY: &'static str;

    fn api(ctx: &Context) -> Arc<dyn ClusterApi<Self::Value>>;

    /// Default object to create when nothing can be adopted.
    fn template(ctx: &Context) -> Self::Value;
}

impl OwnedResource for DeploymentKey {
    const NAME: &'static str = "DeploymentCF";
    const STATUS_KEY: &'static str = STATUS_DEPLOYMENT_NAME;

    fn api(ctx: &Context) -> Arc<dyn ClusterApi<Deployment>> {
        Arc::clone(&ctx.clients().deployments)
    }

    fn template(ctx: &Context) -> Deployment {
        ctx.factory().deployment(ctx.app())
    }
}

impl OwnedResource for ServiceKey {
    const NAME: &'static str = "ServiceCF";
    const STATUS_KEY: &'static str = STATUS_SERVICE_NAME;

    fn api(ctx: &Context) -> Arc<dyn ClusterApi<Service>> {
        Arc::clone(&ctx.clients().services)
    }

    fn template(ctx: &Context) -> Service {
        ctx.factory().service(ctx.app())
    }
}

/// What the cache held for the key at observe time.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Binding {
    Absent,
    /// Bound to [`EMPTY_NAME`]; creation is already requested.
    Pending,
    Bound(String),
    /// Bound to an object that is no longer a candidate.
    Invalidated(String),
}

/// Discovers, adopts or requests the single object owned under `K`.
pub struct SingleOwnerCF<K: OwnedResource> {
    binding: Binding,
    candidates: Option<Vec<K::Value>>,
    _key: PhantomData<fn() -> K>,
}

pub type DeploymentCF = SingleOwnerCF<DeploymentKey>;
pub type ServiceCF = SingleOwnerCF<ServiceKey>;

impl<K: OwnedResource> SingleOwnerCF<K> {
    pub const fn new() -> Self {
        Self {
            binding: Binding::Absent,
            candidates: None,
            _key: PhantomData,
        }
    }
}

impl<K: OwnedResource> Default for SingleOwnerCF<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: OwnedResource> ControlFunction for SingleOwnerCF<K> {
    fn describe(&self) -> &str {
        K::NAME
    }

    async fn observe(&mut self, ctx: &mut Context) {
        let cached = ctx
            .resources()
            .get::<K>()
            .map(|entry| entry.name().to_string());

        if cached.as_deref() == Some(EMPTY_NAME) {
            self.binding = Binding::Pending;
            self.candidates = None;
            return;
        }

        let api = K::api(ctx);
        let namespace = ctx.app().namespace.clone();
        let selector = ctx.selector();
        self.candidates = api
            .list(&namespace, &selector)
            .await
            .into_option_logged()
            .map(|objects| {
                objects
                    .into_iter()
                    .filter(|object| !object.is_terminating())
                    .collect()
            });
        if self.candidates.is_none() {
            ctx.set_requeue();
        }

        self.binding = match (cached, &self.candidates) {
            (None, _) => Binding::Absent,
            (Some(name), None) => Binding::Bound(name),
            (Some(name), Some(candidates)) => {
                if candidates.iter().any(|c| c.object_name() == name) {
                    Binding::Bound(name)
                } else {
                    Binding::Invalidated(name)
                }
            }
        };

        if let Binding::Bound(name) = &self.binding {
            ctx.status_mut().set(K::STATUS_KEY, name.clone());
        }
        debug!(
            key = %K::KEY,
            selector = %selector,
            binding = ?self.binding,
            candidates = self.candidates.as_ref().map(Vec::len),
            "Observed owned resource"
        );
    }

    fn decide(&self) -> bool {
        self.candidates.is_some()
            && matches!(self.binding, Binding::Absent | Binding::Invalidated(_))
    }

    fn act(&mut self, ctx: &mut Context) {
        if let Binding::Invalidated(name) = &self.binding {
            info!(key = %K::KEY, name = %name, "Cached binding vanished, selecting again");
        }

        let candidates = self.candidates.take().unwrap_or_default();
        let entry = match <[K::Value; 1]>::try_from(candidates) {
            Ok([object]) => {
                let name = object.object_name().to_string();
                info!(key = %K::KEY, name = %name, "Adopting existing object");
                ctx.status_mut().set(K::STATUS_KEY, name.clone());
                ResourceCacheEntry::new(name, object)
            }
            Err(candidates) => {
                info!(
                    key = %K::KEY,
                    candidates = candidates.len(),
                    "No single candidate, requesting creation"
                );
                ResourceCacheEntry::pending(K::template(ctx))
            }
        };
        ctx.resources_mut().set::<K>(entry);
    }
}
