//! SCRAM authentication for streams persistence.
//!
//! Wires the credentials, SASL settings and truststore for both the topology
//! and the storage producer clients, mounts the truststore secret into the
//! application container and leaves the JAAS `$(NAME)` references for the
//! container runtime to expand.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::patches::{container, read_only_mount, secret_volume, volume_secret_name};
use crate::context::Context;
use crate::control::ControlFunction;
use crate::env_cache::EnvCacheEntry;
use crate::resource_cache::{DeploymentKey, SpecKey};
use crate::types::PERSISTENCE_STREAMS;

pub const ENV_REGISTRY_PROPERTIES_PREFIX: &str = "REGISTRY_PROPERTIES_PREFIX";
pub const ENV_REGISTRY_STREAMS_SCRAM_USER: &str = "REGISTRY_STREAMS_SCRAM_USER";
pub const ENV_REGISTRY_STREAMS_SCRAM_PASSWORD: &str = "REGISTRY_STREAMS_SCRAM_PASSWORD";

pub const ENV_REGISTRY_STREAMS_TOPOLOGY_SASL_MECHANISM: &str =
    "REGISTRY_STREAMS_TOPOLOGY_SASL_MECHANISM";
pub const ENV_REGISTRY_STREAMS_TOPOLOGY_SASL_JAAS_CONFIG: &str =
    "REGISTRY_STREAMS_TOPOLOGY_SASL_JAAS_CONFIG";
pub const ENV_REGISTRY_STREAMS_TOPOLOGY_SECURITY_PROTOCOL: &str =
    "REGISTRY_STREAMS_TOPOLOGY_SECURITY_PROTOCOL";
pub const ENV_REGISTRY_STREAMS_TOPOLOGY_SSL_TRUSTSTORE_TYPE: &str =
    "REGISTRY_STREAMS_TOPOLOGY_SSL_TRUSTSTORE_TYPE";
pub const ENV_REGISTRY_STREAMS_TOPOLOGY_SSL_TRUSTSTORE_LOCATION: &str =
    "REGISTRY_STREAMS_TOPOLOGY_SSL_TRUSTSTORE_LOCATION";
pub const ENV_REGISTRY_STREAMS_TOPOLOGY_SSL_TRUSTSTORE_PASSWORD: &str =
    "REGISTRY_STREAMS_TOPOLOGY_SSL_TRUSTSTORE_PASSWORD";

pub const ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SASL_MECHANISM: &str =
    "REGISTRY_STREAMS_STORAGE_PRODUCER_SASL_MECHANISM";
pub const ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SASL_JAAS_CONFIG: &str =
    "REGISTRY_STREAMS_STORAGE_PRODUCER_SASL_JAAS_CONFIG";
pub const ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SECURITY_PROTOCOL: &str =
    "REGISTRY_STREAMS_STORAGE_PRODUCER_SECURITY_PROTOCOL";
pub const ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SSL_TRUSTSTORE_TYPE: &str =
    "REGISTRY_STREAMS_STORAGE_PRODUCER_SSL_TRUSTSTORE_TYPE";
pub const ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SSL_TRUSTSTORE_LOCATION: &str =
    "REGISTRY_STREAMS_STORAGE_PRODUCER_SSL_TRUSTSTORE_LOCATION";
pub const ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SSL_TRUSTSTORE_PASSWORD: &str =
    "REGISTRY_STREAMS_STORAGE_PRODUCER_SSL_TRUSTSTORE_PASSWORD";

/// Volume holding the truststore secret.
pub const SCRAM_TRUSTSTORE_VOLUME_NAME: &str = "registry-streams-scram-truststore";

const PASSWORD_SECRET_KEY: &str = "password";
const TRUSTSTORE_PASSWORD_SECRET_KEY: &str = "ca.password";
const SECURITY_PROTOCOL: &str = "SASL_SSL";
const TRUSTSTORE_TYPE: &str = "PKCS12";

fn truststore_mount_path() -> String {
    format!("/etc/{SCRAM_TRUSTSTORE_VOLUME_NAME}")
}

fn truststore_location() -> String {
    format!("{}/ca.p12", truststore_mount_path())
}

fn jaas_config() -> String {
    format!(
        "org.apache.kafka.common.security.scram.ScramLoginModule required \
         username=$({ENV_REGISTRY_STREAMS_SCRAM_USER}) \
         password=$({ENV_REGISTRY_STREAMS_SCRAM_PASSWORD});"
    )
}

/// Settings read from the desired spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Desired {
    truststore_secret_name: String,
    user: String,
    password_secret_name: String,
    mechanism: String,
}

/// The same settings as found in the caches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Found {
    truststore_secret_name: String,
    truststore_mounted: bool,
    user: String,
    password_secret_name: String,
    topology_mechanism: String,
    storage_mechanism: String,
}

impl Found {
    /// Both clients agree on a configured mechanism.
    fn mechanism_ok(&self) -> bool {
        !self.topology_mechanism.is_empty() && self.topology_mechanism == self.storage_mechanism
    }
}

/// Configures SCRAM over SASL_SSL for streams persistence.
#[derive(Debug, Default)]
pub struct StreamsSecurityScramCF {
    desired: Option<Desired>,
    found: Found,
    container_exists: bool,
    app_container: String,
}

impl StreamsSecurityScramCF {
    pub fn new() -> Self {
        Self::default()
    }

    fn env_entries(desired: &Desired) -> Vec<EnvCacheEntry> {
        let jaas = |name: &str| {
            EnvCacheEntry::literal(name, jaas_config())
                .with_dependency(ENV_REGISTRY_STREAMS_SCRAM_USER)
                .with_dependency(ENV_REGISTRY_STREAMS_SCRAM_PASSWORD)
        };
        let truststore_password = |name: &str| {
            EnvCacheEntry::secret_ref(
                name,
                desired.truststore_secret_name.clone(),
                TRUSTSTORE_PASSWORD_SECRET_KEY,
            )
        };

        vec![
            EnvCacheEntry::literal(ENV_REGISTRY_PROPERTIES_PREFIX, "REGISTRY_"),
            EnvCacheEntry::literal(ENV_REGISTRY_STREAMS_SCRAM_USER, desired.user.clone()),
            EnvCacheEntry::secret_ref(
                ENV_REGISTRY_STREAMS_SCRAM_PASSWORD,
                desired.password_secret_name.clone(),
                PASSWORD_SECRET_KEY,
            ),
            EnvCacheEntry::literal(
                ENV_REGISTRY_STREAMS_TOPOLOGY_SASL_MECHANISM,
                desired.mechanism.clone(),
            ),
            jaas(ENV_REGISTRY_STREAMS_TOPOLOGY_SASL_JAAS_CONFIG),
            EnvCacheEntry::literal(ENV_REGISTRY_STREAMS_TOPOLOGY_SECURITY_PROTOCOL, SECURITY_PROTOCOL),
            EnvCacheEntry::literal(ENV_REGISTRY_STREAMS_TOPOLOGY_SSL_TRUSTSTORE_TYPE, TRUSTSTORE_TYPE),
            EnvCacheEntry::literal(
                ENV_REGISTRY_STREAMS_TOPOLOGY_SSL_TRUSTSTORE_LOCATION,
                truststore_location(),
            ),
            truststore_password(ENV_REGISTRY_STREAMS_TOPOLOGY_SSL_TRUSTSTORE_PASSWORD),
            EnvCacheEntry::literal(
                ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SASL_MECHANISM,
                desired.mechanism.clone(),
            ),
            jaas(ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SASL_JAAS_CONFIG),
            EnvCacheEntry::literal(
                ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SECURITY_PROTOCOL,
                SECURITY_PROTOCOL,
            ),
            EnvCacheEntry::literal(
                ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SSL_TRUSTSTORE_TYPE,
                TRUSTSTORE_TYPE,
            ),
            EnvCacheEntry::literal(
                ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SSL_TRUSTSTORE_LOCATION,
                truststore_location(),
            ),
            truststore_password(ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SSL_TRUSTSTORE_PASSWORD),
        ]
    }
}

#[async_trait]
impl ControlFunction for StreamsSecurityScramCF {
    fn describe(&self) -> &str {
        "StreamsSecurityScramCF"
    }

    async fn observe(&mut self, ctx: &mut Context) {
        self.desired = ctx.resources().get::<SpecKey>().and_then(|entry| {
            let configuration = &entry.value().spec.configuration;
            let scram = &configuration.streams.security.scram;
            let valid = configuration.persistence == PERSISTENCE_STREAMS
                && !configuration.streams.bootstrap_servers.is_empty()
                && !scram.truststore_secret_name.is_empty()
                && !scram.user.is_empty()
                && !scram.password_secret_name.is_empty();
            valid.then(|| Desired {
                truststore_secret_name: scram.truststore_secret_name.clone(),
                user: scram.user.clone(),
                password_secret_name: scram.password_secret_name.clone(),
                mechanism: if scram.mechanism.is_empty() {
                    ctx.config().default_scram_mechanism.clone()
                } else {
                    scram.mechanism.clone()
                },
            })
        });

        let deployment = ctx.resources().get::<DeploymentKey>().map(|e| e.current());
        self.app_container.clone_from(&ctx.app().name);
        let app_container = deployment
            .as_deref()
            .and_then(|d| container(d, &self.app_container));
        self.container_exists = app_container.is_some();
        if deployment.is_some() && !self.container_exists && self.desired.is_some() {
            warn!(
                container = %self.app_container,
                "Application container not found, truststore cannot be mounted"
            );
        }
        let mount_path = truststore_mount_path();
        let truststore_mounted = app_container
            .and_then(|c| c.volume_mounts.as_ref())
            .is_some_and(|mounts| {
                mounts
                    .iter()
                    .any(|m| m.name == SCRAM_TRUSTSTORE_VOLUME_NAME && m.mount_path == mount_path)
            });

        let env = ctx.env_cache();
        let literal = |name: &str| {
            env.get(name)
                .and_then(EnvCacheEntry::literal_value)
                .unwrap_or_default()
                .to_string()
        };
        self.found = Found {
            truststore_secret_name: deployment
                .as_deref()
                .and_then(|d| volume_secret_name(d, SCRAM_TRUSTSTORE_VOLUME_NAME))
                .unwrap_or_default(),
            truststore_mounted,
            user: literal(ENV_REGISTRY_STREAMS_SCRAM_USER),
            password_secret_name: env
                .get(ENV_REGISTRY_STREAMS_SCRAM_PASSWORD)
                .and_then(EnvCacheEntry::secret_name)
                .unwrap_or_default()
                .to_string(),
            topology_mechanism: literal(ENV_REGISTRY_STREAMS_TOPOLOGY_SASL_MECHANISM),
            storage_mechanism: literal(ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_SASL_MECHANISM),
        };
        debug!(desired = ?self.desired, found = ?self.found, "Observed SCRAM settings");
    }

    fn decide(&self) -> bool {
        let Some(desired) = &self.desired else {
            return false;
        };
        let found = &self.found;
        // Patches need the application container to land on.
        self.container_exists
            && (desired.truststore_secret_name != found.truststore_secret_name
                || !found.truststore_mounted
                || desired.user != found.user
                || desired.password_secret_name != found.password_secret_name
                || desired.mechanism != found.topology_mechanism
                || !found.mechanism_ok())
    }

    fn act(&mut self, ctx: &mut Context) {
        let Some(desired) = self.desired.take() else {
            return;
        };
        info!(
            user = %desired.user,
            truststore = %desired.truststore_secret_name,
            mechanism = %desired.mechanism,
            "Configuring SCRAM for streams"
        );

        for entry in Self::env_entries(&desired) {
            ctx.env_cache_mut().set(entry);
        }

        let resources = ctx.resources_mut();
        resources.apply_patch::<DeploymentKey, _>(secret_volume(
            SCRAM_TRUSTSTORE_VOLUME_NAME,
            &desired.truststore_secret_name,
        ));
        resources.apply_patch::<DeploymentKey, _>(read_only_mount(
            &self.app_container,
            SCRAM_TRUSTSTORE_VOLUME_NAME,
            &truststore_mount_path(),
        ));
    }
}
