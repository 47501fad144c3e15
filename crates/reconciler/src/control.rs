//! The control function contract.

use async_trait::async_trait;

use crate::context::Context;

/// One independently authored reconciliation unit.
///
/// Every pass calls `observe`, then `decide`, then `act` when `decide`
/// returned `true`. None of the three can fail:
///
/// - `observe` fills the function's own fields from the caches and from
///   candidate listings. A failed listing is recorded as "nothing observed".
/// - `decide` is a pure function of those fields.
/// - `act` writes to the resource cache, the env cache or the requeue flag
///   and nothing else. The committer turns cache state into cluster calls
///   after the pass.
#[async_trait]
pub trait ControlFunction: Send + Sync {
    fn describe(&self) -> &str;

    async fn observe(&mut self, ctx: &mut Context);

    fn decide(&self) -> bool;

    fn act(&mut self, ctx: &mut Context);
}
