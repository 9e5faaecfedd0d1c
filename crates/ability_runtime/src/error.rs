//! Error taxonomy. See §7: usage errors are surfaced synchronously to the
//! caller; runtime and pipeline errors are logged and contained so that a
//! healthy tick never returns `Err`.

use thiserror::Error;

use crate::ids::AbilityId;

/// Misuse by the host, fail-fast at configuration/grant time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("unknown attribute key: {0}")]
    UnknownAttribute(String),

    #[error("no schema registered for attribute key: {0}")]
    SchemaMissing(String),

    #[error("ability {0} is already granted")]
    AlreadyGranted(AbilityId),

    #[error("invalid component configuration: {0}")]
    InvalidComponentConfig(String),

    #[error("timeline asset not registered: {0}")]
    TimelineAssetMissing(String),
}

/// An error raised inside a component lifecycle callback (`on_apply`,
/// `on_tick`, `on_event`, `on_remove`). Always caught locally by the
/// dispatcher; never aborts the tick.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("component error in {component_type} (ability {ability}{}): {message}", event_kind.as_deref().map(|k| format!(", event {k}")).unwrap_or_default())]
pub struct RuntimeCallbackError {
    pub component_type: &'static str,
    pub ability: AbilityId,
    pub event_kind: Option<String>,
    pub message: String,
}

/// An error raised by a pre-phase handler. Logged and treated as `pass`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("pre-handler error for event {event_kind} (ability {ability}): {message}")]
pub struct PipelineError {
    pub event_kind: String,
    pub ability: AbilityId,
    pub message: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Runtime(#[from] RuntimeCallbackError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
