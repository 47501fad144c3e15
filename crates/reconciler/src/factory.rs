//! Default desired objects for keys that have nothing to adopt.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use registry_operator_core::OperatorConfig;

use crate::context::AppIdentity;

/// Builds the objects stored as pending creations.
pub trait ObjectFactory: Send + Sync {
    fn deployment(&self, app: &AppIdentity) -> Deployment;
    fn service(&self, app: &AppIdentity) -> Service;
}

/// Factory producing one-replica deployments and a matching HTTP service.
#[derive(Debug, Clone)]
pub struct DefaultObjectFactory {
    image: String,
    app_label: String,
    container_port: i32,
}

impl DefaultObjectFactory {
    pub fn new(config: &OperatorConfig) -> Self {
        Self {
            image: config.image.clone(),
            app_label: config.app_label.clone(),
            container_port: config.container_port,
        }
    }

    fn labels(&self, app: &AppIdentity) -> BTreeMap<String, String> {
        BTreeMap::from([(self.app_label.clone(), app.name.clone())])
    }

    fn metadata(&self, app: &AppIdentity, role: &str) -> ObjectMeta {
        ObjectMeta {
            generate_name: Some(format!("{}-{role}-", app.name)),
            namespace: Some(app.namespace.clone()),
            labels: Some(self.labels(app)),
            owner_references: app.owner_reference().map(|owner| vec![owner]),
            ..ObjectMeta::default()
        }
    }
}

impl ObjectFactory for DefaultObjectFactory {
    fn deployment(&self, app: &AppIdentity) -> Deployment {
        let container = Container {
            name: app.name.clone(),
            image: Some(self.image.clone()),
            ports: Some(vec![ContainerPort {
                container_port: self.container_port,
                protocol: Some("TCP".to_string()),
                ..ContainerPort::default()
            }]),
            ..Container::default()
        };

        Deployment {
            metadata: self.metadata(app, "deployment"),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(self.labels(app)),
                    ..LabelSelector::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels(app)),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        ..PodSpec::default()
                    }),
                },
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        }
    }

    fn service(&self, app: &AppIdentity) -> Service {
        Service {
            metadata: self.metadata(app, "service"),
            spec: Some(ServiceSpec {
                selector: Some(self.labels(app)),
                ports: Some(vec![ServicePort {
                    name: Some("http".to_string()),
                    port: self.container_port,
                    target_port: Some(IntOrString::Int(self.container_port)),
                    protocol: Some("TCP".to_string()),
                    ..ServicePort::default()
                }]),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        }
    }
}
