//! Pushes the env cache into the application container.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::EnvVar;
use registry_operator_core::ResultExt;
use tracing::debug;

use super::patches::{container, container_env};
use crate::context::Context;
use crate::control::ControlFunction;
use crate::resource_cache::DeploymentKey;

/// Renders the env cache and patches the deployment when the container env
/// differs.
///
/// Managed vars come first in dependency order; vars the container already
/// had under names the cache does not manage are kept after them.
#[derive(Debug, Default)]
pub struct EnvApplyCF {
    desired: Option<Vec<EnvVar>>,
    existing: Option<Vec<EnvVar>>,
    app_container: String,
}

impl EnvApplyCF {
    pub fn new() -> Self {
        Self::default()
    }
}

fn merge(managed: Vec<EnvVar>, existing: &[EnvVar]) -> Vec<EnvVar> {
    let unmanaged: Vec<EnvVar> = existing
        .iter()
        .filter(|var| !managed.iter().any(|m| m.name == var.name))
        .cloned()
        .collect();
    managed.into_iter().chain(unmanaged).collect()
}

#[async_trait]
impl ControlFunction for EnvApplyCF {
    fn describe(&self) -> &str {
        "EnvApplyCF"
    }

    async fn observe(&mut self, ctx: &mut Context) {
        self.app_container.clone_from(&ctx.app().name);
        let app_container = self.app_container.as_str();
        // Without the application container there is nothing to patch.
        self.existing = ctx.resources().get::<DeploymentKey>().and_then(|entry| {
            let existing = container(&entry.current(), app_container)
                .map(|c| c.env.clone().unwrap_or_default());
            if existing.is_none() {
                debug!(
                    deployment = entry.name(),
                    container = app_container,
                    "Application container not found"
                );
            }
            existing
        });
        // A cycle is logged and treated as nothing to apply.
        self.desired = match &self.existing {
            Some(existing) => ctx
                .env_cache()
                .render()
                .into_option_logged()
                .map(|managed| merge(managed, existing)),
            None => None,
        };
        debug!(
            desired = self.desired.as_ref().map(Vec::len),
            existing = self.existing.as_ref().map(Vec::len),
            "Observed container env"
        );
    }

    fn decide(&self) -> bool {
        matches!((&self.desired, &self.existing), (Some(d), Some(e)) if d != e)
    }

    fn act(&mut self, ctx: &mut Context) {
        let Some(env) = self.desired.take() else {
            return;
        };
        debug!(vars = env.len(), "Patching container env");
        ctx.resources_mut()
            .apply_patch::<DeploymentKey, _>(container_env(&self.app_container, env));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, value: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }
    }

    #[test]
    fn test_merge_keeps_unmanaged_after_managed() {
        let merged = merge(
            vec![var("A", "new")],
            &[var("B", "kept"), var("A", "old")],
        );

        assert_eq!(merged, vec![var("A", "new"), var("B", "kept")]);
    }
}
