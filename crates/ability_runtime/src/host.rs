//! Collaborator-facing interfaces the host implements (§6.2).

use crate::ids::ActorId;

/// Opaque to the core; queried by actions and pre-handler filters. The
/// core never holds a `&dyn GameplayState` across a mutable borrow of its
/// own actor state — it is handed in per call.
pub trait GameplayState {
    fn logic_time(&self) -> i64;
    fn alive_actors(&self) -> Vec<ActorId>;
    fn actor_exists(&self, id: &ActorId) -> bool;
}

/// `debug/info/warn/error` with a category tag (§6.2). The crate logs
/// through `tracing` internally; this trait exists for hosts that want to
/// route the same events into their own trace sink instead of (or in
/// addition to) a `tracing` subscriber.
pub trait Logger {
    fn debug(&self, category: &str, message: &str);
    fn info(&self, category: &str, message: &str);
    fn warn(&self, category: &str, message: &str);
    fn error(&self, category: &str, message: &str);
}

/// `Logger` that forwards to `tracing`, used when a host has no bespoke
/// trace sink of its own.
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, category: &str, message: &str) {
        tracing::debug!(target: "ability_runtime", category, message);
    }
    fn info(&self, category: &str, message: &str) {
        tracing::info!(target: "ability_runtime", category, message);
    }
    fn warn(&self, category: &str, message: &str) {
        tracing::warn!(target: "ability_runtime", category, message);
    }
    fn error(&self, category: &str, message: &str) {
        tracing::error!(target: "ability_runtime", category, message);
    }
}
