//! Shared fixtures for reconciler integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use registry_operator_reconciler::{
    ControlFunction, InMemoryCluster, Reconciler, ReconcilerBuilder, Registry,
};

pub const APP: &str = "registry";
pub const NAMESPACE: &str = "kafka";

/// Install the test subscriber once per test binary; later calls are no-ops.
pub fn init_tracing() {
    let _ = registry_operator_core::init_tracing();
}

/// Unwrap a Result or panic with context
pub fn unwrap_result<T, E: std::fmt::Display>(result: std::result::Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{context}: {e}"),
    }
}

/// Unwrap an Option or panic with context
pub fn unwrap_option<T>(option: Option<T>, context: &str) -> T {
    match option {
        Some(value) => value,
        None => panic!("{context}"),
    }
}

pub fn registry() -> Registry {
    let mut registry = Registry::new(APP, NAMESPACE);
    registry.metadata.uid = Some("3f1c9a7e".to_string());
    registry
}

/// Registry persisting to streams with SCRAM credentials.
pub fn scram_registry() -> Registry {
    let mut registry = registry();
    let configuration = &mut registry.spec.configuration;
    configuration.persistence = "streams".to_string();
    configuration.streams.bootstrap_servers = "b:9092".to_string();
    let scram = &mut configuration.streams.security.scram;
    scram.truststore_secret_name = "ts1".to_string();
    scram.user = "u1".to_string();
    scram.password_secret_name = "p1".to_string();
    registry
}

/// A live deployment labelled for the application.
pub fn deployment(name: &str) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), APP.to_string())])),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            template: k8s_openapi::api::core::v1::PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: APP.to_string(),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// Reconciler over `cluster` running only `functions`, spec already stored.
pub fn reconciler_with(
    cluster: &InMemoryCluster,
    spec: Registry,
    functions: Vec<Box<dyn ControlFunction>>,
) -> Reconciler {
    let builder = functions.into_iter().fold(
        ReconcilerBuilder::new().with_clients(cluster.clients()),
        ReconcilerBuilder::with_control_function,
    );
    let mut reconciler = unwrap_result(builder.build(), "reconciler should build");
    reconciler.update(spec);
    reconciler
}
