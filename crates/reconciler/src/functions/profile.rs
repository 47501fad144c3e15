//! Application profile selection.

use async_trait::async_trait;

use crate::context::Context;
use crate::control::ControlFunction;
use crate::env_cache::EnvCacheEntry;

pub const ENV_QUARKUS_PROFILE: &str = "QUARKUS_PROFILE";

/// Ensures the runtime profile env entry exists.
///
/// Only an absent entry is written; a profile set by anyone else wins.
#[derive(Debug, Default)]
pub struct ProfileCF {
    profile: String,
    profile_set: bool,
}

impl ProfileCF {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ControlFunction for ProfileCF {
    fn describe(&self) -> &str {
        "ProfileCF"
    }

    async fn observe(&mut self, ctx: &mut Context) {
        self.profile.clone_from(&ctx.config().profile);
        self.profile_set = ctx.env_cache().contains(ENV_QUARKUS_PROFILE);
    }

    fn decide(&self) -> bool {
        !self.profile_set
    }

    fn act(&mut self, ctx: &mut Context) {
        ctx.env_cache_mut()
            .set(EnvCacheEntry::literal(ENV_QUARKUS_PROFILE, self.profile.clone()));
    }
}
