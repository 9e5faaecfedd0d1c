use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, host-assigned identifier for a participant. The core never
/// interprets this beyond equality/hashing.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Process-unique identifier for a granted `Ability`.
///
/// Uniqueness comes from the triple (owning actor, arena slot, arena
/// generation) rather than a global atomic counter — see the "process-wide
/// registry" design note: no mutable module-level state in the port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbilityId {
    pub actor: ActorId,
    pub index: u32,
    pub generation: u32,
}

impl fmt::Display for AbilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}.{}", self.actor, self.index, self.generation)
    }
}

/// Identifies one `ExecutionInstance` within the ability that spawned it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId {
    pub ability: AbilityId,
    pub seq: u32,
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/exec{}", self.ability, self.seq)
    }
}

/// Identifies a registered pre-phase handler. Derived from the owning
/// ability plus the index of the `PreEventComponent` inside it, so no
/// separate counter is needed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreHandlerId {
    pub ability: AbilityId,
    pub component_index: usize,
}
