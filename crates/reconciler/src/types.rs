//! Desired-state model: the registry custom resource.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Persistence value that selects the Kafka Streams storage.
pub const PERSISTENCE_STREAMS: &str = "streams";

/// API version of the registry custom resource.
pub const REGISTRY_API_VERSION: &str = "registry.apicur.io/v1";

/// Kind of the registry custom resource.
pub const REGISTRY_KIND: &str = "ApicurioRegistry";

/// The registry custom resource as stored under the `spec` cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Registry {
    pub metadata: ObjectMeta,
    pub spec: RegistrySpec,
}

impl Registry {
    /// Create a resource with the given name and namespace and an empty spec.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                ..ObjectMeta::default()
            },
            spec: RegistrySpec::default(),
        }
    }

    /// Resource name, empty when the metadata carries none.
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistrySpec {
    pub configuration: RegistryConfiguration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfiguration {
    /// Storage backend name, e.g. `mem`, `jpa`, `streams`.
    pub persistence: String,
    pub streams: StreamsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamsConfig {
    pub bootstrap_servers: String,
    pub security: StreamsSecurity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamsSecurity {
    pub scram: ScramConfig,
}

/// SCRAM credentials for the Kafka connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScramConfig {
    /// Secret holding `ca.p12` and `ca.password`.
    pub truststore_secret_name: String,
    pub user: String,
    /// Secret holding the user's `password` key.
    pub password_secret_name: String,
    /// SASL mechanism; empty means the configured default.
    pub mechanism: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_custom_resource() {
        let json = serde_json::json!({
            "metadata": { "name": "registry", "namespace": "kafka" },
            "spec": {
                "configuration": {
                    "persistence": "streams",
                    "streams": {
                        "bootstrapServers": "b:9092",
                        "security": {
                            "scram": {
                                "truststoreSecretName": "ts1",
                                "user": "u1",
                                "passwordSecretName": "p1"
                            }
                        }
                    }
                }
            }
        });

        let registry: Result<Registry, _> = serde_json::from_value(json);
        let registry = registry.ok();
        let scram = registry
            .as_ref()
            .map(|r| r.spec.configuration.streams.security.scram.clone());

        assert_eq!(registry.as_ref().map(Registry::name), Some("registry"));
        assert_eq!(
            scram.as_ref().map(|s| s.truststore_secret_name.as_str()),
            Some("ts1")
        );
        assert_eq!(scram.map(|s| s.mechanism), Some(String::new()));
    }

    #[test]
    fn test_missing_spec_defaults_to_empty() {
        let registry: Result<Registry, _> =
            serde_json::from_value(serde_json::json!({ "metadata": { "name": "r" } }));
        assert_eq!(
            registry.ok().map(|r| r.spec),
            Some(RegistrySpec::default())
        );
    }
}
