//! Two-phase event dispatch. §4.5, §4.6.
//!
//! Pre phase: registered handlers run in registration order and may pass,
//! cancel, or modify the event. Post phase: the (possibly modified) event
//! is delivered to every live actor's `AbilitySet::receive_event`.

use std::collections::HashMap;

use crate::ids::{AbilityId, ActorId, PreHandlerId};

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Actor(ActorId),
    Bool(bool),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A discriminated, value-type event flowing through the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct GameEvent {
    pub kind: String,
    pub fields: HashMap<String, FieldValue>,
}

impl GameEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_number(mut self, field: impl Into<String>, value: f64) -> Self {
        self.fields.insert(field.into(), FieldValue::Number(value));
        self
    }

    pub fn with_text(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .insert(field.into(), FieldValue::Text(value.into()));
        self
    }

    pub fn with_actor(mut self, field: impl Into<String>, value: ActorId) -> Self {
        self.fields.insert(field.into(), FieldValue::Actor(value));
        self
    }

    pub fn with_bool(mut self, field: impl Into<String>, value: bool) -> Self {
        self.fields.insert(field.into(), FieldValue::Bool(value));
        self
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(FieldValue::as_number)
    }

    pub fn actor(&self, field: &str) -> Option<&ActorId> {
        match self.fields.get(field) {
            Some(FieldValue::Actor(a)) => Some(a),
            _ => None,
        }
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        match self.fields.get(field) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    // --- Stable integration events (§6.3) ---

    pub fn attribute_changed(actor: ActorId, attribute: String, old: f64, new: f64) -> Self {
        Self::new("attribute_changed")
            .with_actor("actor_id", actor)
            .with_text("attribute", attribute)
            .with_number("old_value", old)
            .with_number("new_value", new)
    }

    pub fn ability_granted(actor: ActorId, ability: &AbilityId, config_id: &str) -> Self {
        Self::new("ability_granted")
            .with_actor("actor_id", actor)
            .with_text("ability_id", ability.to_string())
            .with_text("config_id", config_id.to_string())
    }

    pub fn ability_revoked(actor: ActorId, ability: &AbilityId, config_id: &str, reason: &str) -> Self {
        Self::new("ability_revoked")
            .with_actor("actor_id", actor)
            .with_text("ability_id", ability.to_string())
            .with_text("config_id", config_id.to_string())
            .with_text("reason", reason.to_string())
    }

    pub fn tag_changed(actor: ActorId, tag: String, old_stacks: u32, new_stacks: u32) -> Self {
        Self::new("tag_changed")
            .with_actor("actor_id", actor)
            .with_text("tag", tag)
            .with_number("old_stacks", old_stacks as f64)
            .with_number("new_stacks", new_stacks as f64)
    }
}

/// Push-only sink for outgoing events (§6.2 `EventCollector`).
pub trait EventCollector {
    fn push(&mut self, event: GameEvent);
}

/// Reference `EventCollector` used by tests and simple hosts.
#[derive(Default)]
pub struct VecCollector {
    events: Vec<GameEvent>,
}

impl EventCollector for VecCollector {
    fn push(&mut self, event: GameEvent) {
        self.events.push(event);
    }
}

impl VecCollector {
    pub fn flush(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn peek(&self) -> &[GameEvent] {
        &self.events
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOp {
    Set,
    Add,
    Multiply,
}

#[derive(Clone, Debug)]
pub struct Patch {
    pub field: String,
    pub operation: PatchOp,
    pub value: FieldValue,
}

impl Patch {
    fn apply(&self, event: &mut GameEvent) {
        match self.operation {
            PatchOp::Set => {
                event.fields.insert(self.field.clone(), self.value.clone());
            }
            PatchOp::Add => {
                let current = event.number(&self.field).unwrap_or(0.0);
                let delta = self.value.as_number().unwrap_or(0.0);
                event
                    .fields
                    .insert(self.field.clone(), FieldValue::Number(current + delta));
            }
            PatchOp::Multiply => {
                let current = event.number(&self.field).unwrap_or(0.0);
                let factor = self.value.as_number().unwrap_or(1.0);
                event
                    .fields
                    .insert(self.field.clone(), FieldValue::Number(current * factor));
            }
        }
    }
}

/// A predicate tested against an event before a handler/reaction runs.
pub type EventFilter = Box<dyn Fn(&GameEvent) -> bool>;

/// Return value of a pre-phase handler (§4.5, §4.6 Intent).
pub enum Intent {
    Pass,
    Cancel(String),
    Modify(Vec<Patch>),
}

/// A handler-level failure. The port's answer to "if a handler throws":
/// handlers return `Result` instead of panicking; an `Err` is logged and
/// treated exactly like `Intent::Pass`.
pub type PreHandlerResult = Result<Intent, String>;

struct PreHandlerEntry {
    id: PreHandlerId,
    event_kind: String,
    #[allow(dead_code)]
    owner: ActorId,
    ability: AbilityId,
    #[allow(dead_code)]
    config_id: String,
    filter: Option<EventFilter>,
    handler: Box<dyn FnMut(&mut GameEvent) -> PreHandlerResult>,
}

pub struct PreHandlerSpec {
    pub id: PreHandlerId,
    pub event_kind: String,
    pub owner: ActorId,
    pub ability: AbilityId,
    pub config_id: String,
    pub filter: Option<EventFilter>,
    pub handler: Box<dyn FnMut(&mut GameEvent) -> PreHandlerResult>,
}

pub enum PreOutcome {
    Passed(GameEvent),
    Cancelled { event: GameEvent, reason: String },
}

/// Outcome trace for a single pre-phase dispatch, handed to the host's
/// trace sink (§6.2 Logger).
#[derive(Default)]
pub struct PipelineTrace {
    pub handler_errors: Vec<crate::error::PipelineError>,
}

/// The pipeline itself: holds every registered pre-phase handler across
/// every actor. Post-phase delivery happens outside this type, via
/// `AbilitySet::receive_event` on each live actor (§4.5).
#[derive(Default)]
pub struct EventPipeline {
    handlers: Vec<PreHandlerEntry>,
}

impl EventPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pre_handler(&mut self, spec: PreHandlerSpec) {
        self.handlers.push(PreHandlerEntry {
            id: spec.id,
            event_kind: spec.event_kind,
            owner: spec.owner,
            ability: spec.ability,
            config_id: spec.config_id,
            filter: spec.filter,
            handler: spec.handler,
        });
    }

    pub fn unregister_pre_handler(&mut self, id: &PreHandlerId) {
        self.handlers.retain(|h| &h.id != id);
    }

    /// Number of live pre-phase registrations, for tests asserting that
    /// distinct handlers get distinct ids.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Runs the pre phase for `event`. Handlers registered by a side
    /// effect of this very dispatch (practically: none, since registration
    /// only happens in `on_apply`/`on_remove` outside dispatch) do not
    /// affect it — the handler list is snapshotted by index up front.
    pub fn dispatch_pre(&mut self, mut event: GameEvent, trace: &mut PipelineTrace) -> PreOutcome {
        let applicable: Vec<usize> = self
            .handlers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.event_kind == event.kind)
            .map(|(i, _)| i)
            .collect();

        for index in applicable {
            let Some(entry) = self.handlers.get_mut(index) else {
                continue;
            };
            if let Some(filter) = &entry.filter {
                if !filter(&event) {
                    continue;
                }
            }
            match (entry.handler)(&mut event) {
                Ok(Intent::Pass) => continue,
                Ok(Intent::Cancel(reason)) => {
                    tracing::warn!(target: "ability_runtime::pipeline", event = %event.kind, %reason, "event cancelled in pre phase");
                    return PreOutcome::Cancelled { event, reason };
                }
                Ok(Intent::Modify(patches)) => {
                    for patch in &patches {
                        patch.apply(&mut event);
                    }
                }
                Err(message) => {
                    let error = crate::error::PipelineError {
                        event_kind: event.kind.clone(),
                        ability: entry.ability.clone(),
                        message,
                    };
                    tracing::error!(target: "ability_runtime::pipeline", %error, "pre-handler error, treated as pass");
                    trace.handler_errors.push(error);
                }
            }
        }

        PreOutcome::Passed(event)
    }
}
