//! Long-lived state shared by every control function.
//!
//! One [`Context`] exists per managed application. Its caches keep their
//! identity across passes; only their contents change. A binding adopted or
//! requested in one pass is therefore still there in the next, which is what
//! makes repeated passes converge instead of repeating work.

use std::sync::Arc;

use indexmap::IndexMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use registry_operator_core::OperatorConfig;

use crate::cluster::{Clients, Selector};
use crate::env_cache::EnvCache;
use crate::factory::ObjectFactory;
use crate::resource_cache::{ResourceCache, ResourceCacheEntry, SpecKey};
use crate::types::{REGISTRY_API_VERSION, REGISTRY_KIND, Registry};

/// Identity of the managed application, refreshed from the resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppIdentity {
    pub name: String,
    pub namespace: String,
    pub uid: Option<String>,
}

impl AppIdentity {
    pub fn from_registry(registry: &Registry) -> Self {
        Self {
            name: registry.name().to_string(),
            namespace: registry.metadata.namespace.clone().unwrap_or_default(),
            uid: registry.metadata.uid.clone(),
        }
    }

    /// Controller reference for owned objects; `None` until the uid is known.
    pub fn owner_reference(&self) -> Option<OwnerReference> {
        self.uid.as_ref().map(|uid| OwnerReference {
            api_version: REGISTRY_API_VERSION.to_string(),
            kind: REGISTRY_KIND.to_string(),
            name: self.name.clone(),
            uid: uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        })
    }
}

/// Status key holding the bound deployment name.
pub const STATUS_DEPLOYMENT_NAME: &str = "deploymentName";
/// Status key holding the bound service name.
pub const STATUS_SERVICE_NAME: &str = "serviceName";

/// Values recorded during observe for the resource status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    values: IndexMap<String, String>,
}

impl Status {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Shared state for one managed application.
pub struct Context {
    config: OperatorConfig,
    app: AppIdentity,
    resources: ResourceCache,
    env: EnvCache,
    status: Status,
    clients: Clients,
    factory: Arc<dyn ObjectFactory>,
    requeue: bool,
}

impl Context {
    pub fn new(config: OperatorConfig, clients: Clients, factory: Arc<dyn ObjectFactory>) -> Self {
        Self {
            config,
            app: AppIdentity::default(),
            resources: ResourceCache::new(),
            env: EnvCache::new(),
            status: Status::default(),
            clients,
            factory,
            requeue: false,
        }
    }

    /// Refresh per-pass state from the latest desired spec.
    ///
    /// The spec entry is only replaced when the spec actually changed.
    pub fn update(&mut self, spec: Registry) {
        self.app = AppIdentity::from_registry(&spec);
        let unchanged = self
            .resources
            .get::<SpecKey>()
            .is_some_and(|entry| entry.value().as_ref() == &spec);
        if !unchanged {
            let name = spec.name().to_string();
            self.resources
                .set::<SpecKey>(ResourceCacheEntry::new(name, spec));
        }
    }

    pub const fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub const fn app(&self) -> &AppIdentity {
        &self.app
    }

    /// Selector matching objects owned by the application.
    pub fn selector(&self) -> Selector {
        Selector::label(self.config.app_label.clone(), self.app.name.clone())
    }

    pub const fn resources(&self) -> &ResourceCache {
        &self.resources
    }

    pub const fn resources_mut(&mut self) -> &mut ResourceCache {
        &mut self.resources
    }

    pub const fn env_cache(&self) -> &EnvCache {
        &self.env
    }

    pub const fn env_cache_mut(&mut self) -> &mut EnvCache {
        &mut self.env
    }

    pub const fn status(&self) -> &Status {
        &self.status
    }

    pub const fn status_mut(&mut self) -> &mut Status {
        &mut self.status
    }

    pub const fn clients(&self) -> &Clients {
        &self.clients
    }

    pub fn factory(&self) -> &dyn ObjectFactory {
        self.factory.as_ref()
    }

    pub const fn set_requeue(&mut self) {
        self.requeue = true;
    }

    /// Read and clear the requeue flag.
    pub const fn take_requeue(&mut self) -> bool {
        let requeue = self.requeue;
        self.requeue = false;
        requeue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InMemoryCluster;
    use crate::factory::DefaultObjectFactory;

    fn context() -> Context {
        let config = OperatorConfig::default();
        let factory = Arc::new(DefaultObjectFactory::new(&config));
        Context::new(config, InMemoryCluster::new().clients(), factory)
    }

    #[test]
    fn test_update_stores_spec_and_identity() {
        let mut ctx = context();
        ctx.update(Registry::new("registry", "kafka"));

        assert_eq!(ctx.app().namespace, "kafka");
        assert_eq!(
            ctx.resources().get::<SpecKey>().map(ResourceCacheEntry::name),
            Some("registry")
        );
        assert_eq!(ctx.selector(), Selector::label("app", "registry"));
    }

    #[test]
    fn test_identical_update_is_not_a_mutation() {
        let mut ctx = context();
        ctx.update(Registry::new("registry", "kafka"));
        let generation = ctx.resources().generation();

        ctx.update(Registry::new("registry", "kafka"));
        assert_eq!(ctx.resources().generation(), generation);

        let mut changed = Registry::new("registry", "kafka");
        changed.spec.configuration.persistence = "streams".to_string();
        ctx.update(changed);
        assert_eq!(ctx.resources().generation(), generation + 1);
    }

    #[test]
    fn test_take_requeue_clears_flag() {
        let mut ctx = context();
        ctx.set_requeue();

        assert!(ctx.take_requeue());
        assert!(!ctx.take_requeue());
    }

    #[test]
    fn test_owner_reference_requires_uid() {
        let mut registry = Registry::new("registry", "kafka");
        assert!(AppIdentity::from_registry(&registry).owner_reference().is_none());

        registry.metadata.uid = Some("uid-1".to_string());
        let owner = AppIdentity::from_registry(&registry).owner_reference();
        assert_eq!(owner.map(|o| o.controller), Some(Some(true)));
    }
}
