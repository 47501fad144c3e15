//! Streams persistence bootstrap settings.

use async_trait::async_trait;

use crate::context::Context;
use crate::control::ControlFunction;
use crate::env_cache::EnvCacheEntry;
use crate::resource_cache::SpecKey;
use crate::types::PERSISTENCE_STREAMS;

pub const ENV_REGISTRY_STREAMS_TOPOLOGY_BOOTSTRAP_SERVERS: &str =
    "REGISTRY_STREAMS_TOPOLOGY_BOOTSTRAP_SERVERS";
pub const ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_BOOTSTRAP_SERVERS: &str =
    "REGISTRY_STREAMS_STORAGE_PRODUCER_BOOTSTRAP_SERVERS";
pub const ENV_REGISTRY_STREAMS_TOPOLOGY_APPLICATION_ID: &str =
    "REGISTRY_STREAMS_TOPOLOGY_APPLICATION_ID";

/// Writes bootstrap servers and the topology application id when the
/// registry persists to streams.
#[derive(Debug, Default)]
pub struct StreamsCF {
    desired: Vec<EnvCacheEntry>,
    up_to_date: bool,
}

impl StreamsCF {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ControlFunction for StreamsCF {
    fn describe(&self) -> &str {
        "StreamsCF"
    }

    async fn observe(&mut self, ctx: &mut Context) {
        self.desired.clear();
        let Some(spec) = ctx.resources().get::<SpecKey>().map(|e| e.value().clone()) else {
            return;
        };
        let configuration = &spec.spec.configuration;
        let servers = &configuration.streams.bootstrap_servers;
        if configuration.persistence != PERSISTENCE_STREAMS || servers.is_empty() {
            return;
        }

        self.desired = vec![
            EnvCacheEntry::literal(ENV_REGISTRY_STREAMS_TOPOLOGY_BOOTSTRAP_SERVERS, servers.clone()),
            EnvCacheEntry::literal(
                ENV_REGISTRY_STREAMS_STORAGE_PRODUCER_BOOTSTRAP_SERVERS,
                servers.clone(),
            ),
            EnvCacheEntry::literal(
                ENV_REGISTRY_STREAMS_TOPOLOGY_APPLICATION_ID,
                ctx.app().name.clone(),
            ),
        ];
        let env = ctx.env_cache();
        self.up_to_date = self
            .desired
            .iter()
            .all(|entry| env.get(entry.name()) == Some(entry));
    }

    fn decide(&self) -> bool {
        !self.desired.is_empty() && !self.up_to_date
    }

    fn act(&mut self, ctx: &mut Context) {
        for entry in self.desired.drain(..) {
            ctx.env_cache_mut().set(entry);
        }
    }
}
