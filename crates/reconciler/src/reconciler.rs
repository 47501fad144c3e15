//! Reconciliation loop driver.

use std::sync::Arc;
use std::time::Duration;

use registry_operator_core::OperatorConfig;
use tracing::{debug, info};

use crate::cluster::Clients;
use crate::commit::{CommitReport, ResourceCommitter};
use crate::context::Context;
use crate::control::ControlFunction;
use crate::error::{Error, Result};
use crate::factory::{DefaultObjectFactory, ObjectFactory};
use crate::functions::default_control_functions;
use crate::types::Registry;

/// Outcome of one pass over the control functions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Functions that acted, in execution order.
    pub acted: Vec<String>,
    pub requeue: bool,
}

impl PassReport {
    /// Whether the pass changed nothing.
    pub fn converged(&self) -> bool {
        self.acted.is_empty() && !self.requeue
    }
}

/// Outcome of update, pass and commit together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub pass: PassReport,
    pub commit: CommitReport,
    /// Set when the host should schedule another pass after this delay.
    pub requeue_after: Option<Duration>,
}

/// Runs an ordered list of control functions against one application.
///
/// Passes take `&mut self`, so at most one runs at a time.
pub struct Reconciler {
    ctx: Context,
    functions: Vec<Box<dyn ControlFunction>>,
}

impl Reconciler {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            functions: Vec::new(),
        }
    }

    /// Append a control function; functions run in the order added.
    pub fn add_control_function(&mut self, function: Box<dyn ControlFunction>) {
        debug!(function = function.describe(), "Registered control function");
        self.functions.push(function);
    }

    /// Store the latest desired spec and refresh the application identity.
    pub fn update(&mut self, spec: Registry) {
        self.ctx.update(spec);
    }

    /// Run observe, decide and act for every control function in order.
    ///
    /// Always runs to completion. The requeue flag is cleared afterwards and
    /// returned in the report.
    pub async fn run(&mut self) -> PassReport {
        let mut acted = Vec::new();
        for function in &mut self.functions {
            function.observe(&mut self.ctx).await;
            if function.decide() {
                debug!(function = function.describe(), "Acting");
                function.act(&mut self.ctx);
                acted.push(function.describe().to_string());
            }
        }

        let report = PassReport {
            acted,
            requeue: self.ctx.take_requeue(),
        };
        if report.converged() {
            debug!("Pass converged");
        } else {
            info!(acted = ?report.acted, requeue = report.requeue, "Pass complete");
        }
        report
    }

    /// Update with `spec`, run a pass, then commit the resource cache.
    pub async fn reconcile(
        &mut self,
        spec: Registry,
        committer: &ResourceCommitter,
    ) -> ReconcileOutcome {
        self.update(spec);
        let pass = self.run().await;
        let commit = committer.commit(&mut self.ctx).await;
        let requeue = pass.requeue || commit.requeue();
        ReconcileOutcome {
            pass,
            commit,
            requeue_after: requeue.then(|| self.ctx.config().requeue_delay()),
        }
    }

    pub const fn context(&self) -> &Context {
        &self.ctx
    }

    pub const fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Registered function names in execution order.
    pub fn control_functions(&self) -> Vec<&str> {
        self.functions.iter().map(|f| f.describe()).collect()
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    config: OperatorConfig,
    clients: Option<Clients>,
    factory: Option<Arc<dyn ObjectFactory>>,
    functions: Vec<Box<dyn ControlFunction>>,
}

impl ReconcilerBuilder {
    pub fn new() -> Self {
        Self {
            config: OperatorConfig::default(),
            clients: None,
            factory: None,
            functions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: OperatorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_clients(mut self, clients: Clients) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Set a custom object factory. Defaults to [`DefaultObjectFactory`].
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn ObjectFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    #[must_use]
    pub fn with_control_function(mut self, function: Box<dyn ControlFunction>) -> Self {
        self.functions.push(function);
        self
    }

    /// Append the standard control functions.
    #[must_use]
    pub fn with_default_control_functions(mut self) -> Self {
        self.functions.extend(default_control_functions());
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns an error when no clients were given or the configuration is
    /// invalid.
    pub fn build(self) -> Result<Reconciler> {
        self.config.validate()?;
        let clients = self
            .clients
            .ok_or_else(|| Error::invalid_config("cluster clients are required"))?;
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(DefaultObjectFactory::new(&self.config)));

        let mut reconciler = Reconciler::new(Context::new(self.config, clients, factory));
        for function in self.functions {
            reconciler.add_control_function(function);
        }
        Ok(reconciler)
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::cluster::InMemoryCluster;
    use crate::env_cache::EnvCacheEntry;

    /// Writes one env entry and records the requeue flag on every act.
    struct Recorder {
        name: &'static str,
        seen: bool,
        requeue: bool,
    }

    #[async_trait]
    impl ControlFunction for Recorder {
        fn describe(&self) -> &str {
            self.name
        }

        async fn observe(&mut self, ctx: &mut Context) {
            self.seen = ctx.env_cache().contains(self.name);
        }

        fn decide(&self) -> bool {
            !self.seen
        }

        fn act(&mut self, ctx: &mut Context) {
            ctx.env_cache_mut()
                .set(EnvCacheEntry::literal(self.name, "1"));
            if self.requeue {
                ctx.set_requeue();
            }
        }
    }

    fn recorder(name: &'static str, requeue: bool) -> Box<dyn ControlFunction> {
        Box::new(Recorder {
            name,
            seen: false,
            requeue,
        })
    }

    fn builder() -> ReconcilerBuilder {
        ReconcilerBuilder::new().with_clients(InMemoryCluster::new().clients())
    }

    fn build(builder: ReconcilerBuilder) -> Option<Reconciler> {
        let result = builder.build();
        assert!(result.is_ok(), "build failed: {:?}", result.as_ref().err());
        result.ok()
    }

    #[tokio::test]
    async fn test_run_executes_in_registration_order() {
        let Some(mut reconciler) = build(
            builder()
                .with_control_function(recorder("B", false))
                .with_control_function(recorder("A", false)),
        ) else {
            return;
        };

        let report = reconciler.run().await;

        assert_eq!(report.acted, vec!["B".to_string(), "A".to_string()]);
        let names: Vec<_> = reconciler
            .context()
            .env_cache()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_second_pass_acts_on_nothing() {
        let Some(mut reconciler) = build(builder().with_control_function(recorder("A", false)))
        else {
            return;
        };

        reconciler.run().await;
        let generation = reconciler.context().env_cache().generation();
        let report = reconciler.run().await;

        assert!(report.converged());
        assert_eq!(reconciler.context().env_cache().generation(), generation);
    }

    #[tokio::test]
    async fn test_requeue_is_read_and_cleared() {
        let Some(mut reconciler) = build(builder().with_control_function(recorder("A", true)))
        else {
            return;
        };

        assert!(reconciler.run().await.requeue);
        assert!(!reconciler.run().await.requeue);
    }

    #[test]
    fn test_builder_requires_clients() {
        let result = ReconcilerBuilder::new().build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = OperatorConfig {
            image: String::new(),
            ..OperatorConfig::default()
        };
        let result = builder().with_config(config).build();
        assert!(matches!(result, Err(Error::Core(_))));
    }

    #[test]
    fn test_builder_registers_defaults_in_order() {
        let Some(reconciler) = build(builder().with_default_control_functions()) else {
            return;
        };

        assert_eq!(
            reconciler.control_functions(),
            vec![
                "DeploymentCF",
                "ServiceCF",
                "ProfileCF",
                "StreamsCF",
                "StreamsSecurityScramCF",
                "EnvApplyCF",
            ]
        );
    }
}
