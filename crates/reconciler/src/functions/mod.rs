//! The standard control functions.

pub mod env_apply;
pub mod patches;
pub mod profile;
pub mod scram;
pub mod single_owner;
pub mod streams;

pub use env_apply::EnvApplyCF;
pub use profile::ProfileCF;
pub use scram::StreamsSecurityScramCF;
pub use single_owner::{DeploymentCF, OwnedResource, ServiceCF, SingleOwnerCF};
pub use streams::StreamsCF;

use crate::control::ControlFunction;

/// The standard functions in registration order.
///
/// Discovery runs first so the env and patch writers see this pass's
/// bindings; env apply runs last so it sees every env write.
pub fn default_control_functions() -> Vec<Box<dyn ControlFunction>> {
    vec![
        Box::new(DeploymentCF::new()),
        Box::new(ServiceCF::new()),
        Box::new(ProfileCF::new()),
        Box::new(StreamsCF::new()),
        Box::new(StreamsSecurityScramCF::new()),
        Box::new(EnvApplyCF::new()),
    ]
}
