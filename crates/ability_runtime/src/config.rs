//! Configuration surface. See §6.4: recognized options are enumerated as
//! struct fields rather than a stringly-typed map, so the type system
//! catches typos at compile time (§9 "config objects with optional fields").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TraceLevel {
    Off,
    Event,
    #[default]
    Pipeline,
    Verbose,
}

/// `{ rngSeed, deterministicMode, traceLevel, emitChangedEventsPerAttribute }`
/// from §6.4, built at host init and handed to every `AbilitySet`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub rng_seed: u64,
    #[serde(default = "default_true")]
    pub deterministic_mode: bool,
    #[serde(default)]
    pub trace_level: TraceLevel,
    #[serde(default)]
    pub emit_changed_events_per_attribute: HashMap<String, bool>,
    /// §9 Open Question 1. Current behavior (`false`): a tag at offset 0
    /// never fires, since firing requires `previousElapsed < offset`. Set
    /// to `true` to additionally fire offset-0 tags on the first tick
    /// (`previousElapsed == 0 == offset`).
    #[serde(default)]
    pub timeline_zero_offset_inclusive: bool,
}

fn default_true() -> bool {
    true
}

impl RuntimeConfig {
    pub fn new(rng_seed: u64) -> Self {
        Self {
            rng_seed,
            deterministic_mode: true,
            trace_level: TraceLevel::default(),
            emit_changed_events_per_attribute: HashMap::new(),
            timeline_zero_offset_inclusive: false,
        }
    }

    /// Whether `AttributeChanged` should be emitted for `key`. Attributes
    /// with no explicit entry default to emitting (§4.1 "some are silent").
    pub fn emits_changed(&self, key: &str) -> bool {
        self.emit_changed_events_per_attribute
            .get(key)
            .copied()
            .unwrap_or(true)
    }
}

/// Static per-attribute configuration: default value, clamp range, and
/// whether a write should be silent. §4.1 "Dependent attributes ... are
/// recomputed on every write to their dependencies; cross-attribute
/// clamping is spec'd per attribute schema."
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub default: f64,
    pub min: f64,
    pub max: f64,
    /// Attributes whose *current value* is re-clamped whenever this
    /// attribute's current value changes (e.g. `hp` depends on `max_hp`).
    /// Decision for §9 Open Question 4: dependents are re-clamped on every
    /// write, not lazily at read — see DESIGN.md.
    #[serde(default)]
    pub dependents: Vec<String>,
}

impl AttributeSpec {
    pub fn new(default: f64, min: f64, max: f64) -> Self {
        Self {
            default,
            min,
            max,
            dependents: Vec::new(),
        }
    }

    pub fn with_dependents(mut self, dependents: impl IntoIterator<Item = String>) -> Self {
        self.dependents = dependents.into_iter().collect();
        self
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Collaborator interface (§6.2): static config declaring attribute keys,
/// defaults, per-attribute min/max, and silent/emit flag.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub attributes: HashMap<String, AttributeSpec>,
}

impl AttributeSchema {
    pub fn register(&mut self, key: impl Into<String>, spec: AttributeSpec) -> &mut Self {
        self.attributes.insert(key.into(), spec);
        self
    }

    pub fn get(&self, key: &str) -> Option<&AttributeSpec> {
        self.attributes.get(key)
    }
}
