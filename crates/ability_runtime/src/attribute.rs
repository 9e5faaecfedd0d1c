//! Per-actor numeric state with layered modifiers. §4.1.
//!
//! Current value = `(base + sum(add modifiers)) * product(multiply modifiers)`,
//! clamped to the attribute's schema range and then re-clamped against any
//! dependent attribute's current value (e.g. `hp` bounded by `max_hp`).
//! Resolution of §9 Open Question 4: dependent clamps are recomputed
//! eagerly on every write to the driving attribute, not lazily at read —
//! see DESIGN.md.

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::config::{AttributeSchema, RuntimeConfig};
use crate::error::UsageError;
use crate::event::{EventCollector, GameEvent};
use crate::ids::{ActorId, AbilityId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierOp {
    Add,
    Multiply,
}

#[derive(Clone, Debug)]
pub struct ModifierSpec {
    pub attribute: String,
    pub source: AbilityId,
    pub operation: ModifierOp,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModifierId {
    #[allow(dead_code)]
    seq: u64,
}

struct ModifierEntry {
    id: ModifierId,
    source: AbilityId,
    operation: ModifierOp,
    value: f64,
}

struct AttributeState {
    base: f64,
    modifiers: Vec<ModifierEntry>,
    current: f64,
}

fn compute_raw(base: f64, modifiers: &[ModifierEntry]) -> f64 {
    let add: f64 = modifiers
        .iter()
        .filter(|m| m.operation == ModifierOp::Add)
        .map(|m| m.value)
        .sum();
    let multiply: f64 = modifiers
        .iter()
        .filter(|m| m.operation == ModifierOp::Multiply)
        .fold(1.0, |acc, m| acc * m.value);
    (base + add) * multiply
}

/// Per-actor attribute store. The only sanctioned mutation path is through
/// `set_base`/`add_modifier`/`remove_modifier*` on this type — components
/// never write attribute values any other way.
pub struct AttributeStore {
    actor: ActorId,
    schema: Rc<AttributeSchema>,
    config: Rc<RuntimeConfig>,
    values: HashMap<String, AttributeState>,
    bound_by: HashMap<String, String>,
    next_modifier_seq: u64,
}

impl AttributeStore {
    pub fn new(actor: ActorId, schema: Rc<AttributeSchema>, config: Rc<RuntimeConfig>) -> Self {
        let mut bound_by = HashMap::new();
        for (driver, spec) in &schema.attributes {
            for dependent in &spec.dependents {
                bound_by.insert(dependent.clone(), driver.clone());
            }
        }
        let mut values = HashMap::new();
        for (key, spec) in &schema.attributes {
            values.insert(
                key.clone(),
                AttributeState {
                    base: spec.default,
                    modifiers: Vec::new(),
                    current: spec.clamp(spec.default),
                },
            );
        }
        Self {
            actor,
            schema,
            config,
            values,
            bound_by,
            next_modifier_seq: 0,
        }
    }

    fn spec(&self, key: &str) -> Result<&crate::config::AttributeSpec, UsageError> {
        self.schema
            .get(key)
            .ok_or_else(|| UsageError::UnknownAttribute(key.to_string()))
    }

    /// Same lookup as `spec`, but for the write path (`set_base`/
    /// `add_modifier`): a key absent from the schema there means no schema
    /// was ever registered for it, distinct from a caller reading a typo'd
    /// key — see `UsageError::SchemaMissing` (§4.1 "write when no schema
    /// registered").
    fn write_spec(&self, key: &str) -> Result<&crate::config::AttributeSpec, UsageError> {
        self.schema
            .get(key)
            .ok_or_else(|| UsageError::SchemaMissing(key.to_string()))
    }

    pub fn get(&self, key: &str) -> Result<f64, UsageError> {
        self.spec(key)?;
        Ok(self.values.get(key).map(|s| s.current).unwrap_or(0.0))
    }

    /// Read-only view distributed to consumers that must not mutate.
    pub fn reader(&self) -> AttributeReader<'_> {
        AttributeReader { store: self }
    }

    fn recompute(&mut self, key: &str, collector: &mut dyn EventCollector) {
        let Some(spec) = self.schema.get(key) else {
            return;
        };
        let Some(state) = self.values.get(key) else {
            return;
        };
        let raw = compute_raw(state.base, &state.modifiers);
        let mut clamped = spec.clamp(raw);
        if let Some(driver) = self.bound_by.get(key) {
            if let Some(driver_state) = self.values.get(driver) {
                clamped = clamped.min(driver_state.current);
            }
        }
        let old = state.current;
        if (old - clamped).abs() > f64::EPSILON {
            if let Some(state) = self.values.get_mut(key) {
                state.current = clamped;
            }
            if self.config.emits_changed(key) {
                collector.push(GameEvent::attribute_changed(
                    self.actor.clone(),
                    key.to_string(),
                    old,
                    clamped,
                ));
            }
        }

        // Re-clamp every attribute whose ceiling is `key`.
        let dependents: Vec<String> = self
            .bound_by
            .iter()
            .filter(|(_, driver)| driver.as_str() == key)
            .map(|(dep, _)| dep.clone())
            .collect();
        for dependent in dependents {
            self.recompute(&dependent, collector);
        }
    }

    pub fn set_base(
        &mut self,
        key: &str,
        value: f64,
        collector: &mut dyn EventCollector,
    ) -> Result<(), UsageError> {
        self.write_spec(key)?;
        if let Some(state) = self.values.get_mut(key) {
            state.base = value;
        }
        self.recompute(key, collector);
        Ok(())
    }

    pub fn add_modifier(
        &mut self,
        spec: ModifierSpec,
        collector: &mut dyn EventCollector,
    ) -> Result<ModifierId, UsageError> {
        self.write_spec(&spec.attribute)?;
        let id = ModifierId {
            seq: self.next_modifier_seq,
        };
        self.next_modifier_seq += 1;
        if let Some(state) = self.values.get_mut(&spec.attribute) {
            state.modifiers.push(ModifierEntry {
                id,
                source: spec.source,
                operation: spec.operation,
                value: spec.value,
            });
        }
        self.recompute(&spec.attribute, collector);
        Ok(id)
    }

    pub fn remove_modifier(&mut self, key: &str, id: ModifierId, collector: &mut dyn EventCollector) {
        if let Some(state) = self.values.get_mut(key) {
            state.modifiers.retain(|m| m.id != id);
        }
        self.recompute(key, collector);
    }

    /// Removes every modifier contributed by `source`, across all
    /// attributes. Bulk cleanup path used at ability revoke.
    pub fn remove_modifiers_by_source(&mut self, source: &AbilityId, collector: &mut dyn EventCollector) {
        let keys: Vec<String> = self.values.keys().cloned().collect();
        for key in keys {
            let had = self
                .values
                .get(&key)
                .map(|s| s.modifiers.iter().any(|m| &m.source == source))
                .unwrap_or(false);
            if !had {
                continue;
            }
            if let Some(state) = self.values.get_mut(&key) {
                state.modifiers.retain(|m| &m.source != source);
            }
            self.recompute(&key, collector);
        }
    }

    /// Count of live modifiers with the given source, for tests asserting
    /// the "modifier cleanup" invariant (§8).
    pub fn modifier_count_by_source(&self, source: &AbilityId) -> usize {
        self.values
            .values()
            .flat_map(|s| s.modifiers.iter())
            .filter(|m| &m.source == source)
            .count()
    }
}

/// Read-only view of an `AttributeStore`, handed to consumers that must
/// not mutate attributes directly.
pub struct AttributeReader<'a> {
    store: &'a AttributeStore,
}

impl<'a> AttributeReader<'a> {
    pub fn get(&self, key: &str) -> Result<f64, UsageError> {
        self.store.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeSpec;
    use crate::event::VecCollector;

    fn actor_id(ability_seq: u32) -> AbilityId {
        AbilityId {
            actor: ActorId::new("hero"),
            index: ability_seq,
            generation: 0,
        }
    }

    fn schema() -> Rc<AttributeSchema> {
        let mut schema = AttributeSchema::default();
        schema.register("atk", AttributeSpec::new(50.0, 0.0, 9999.0));
        schema.register("max_hp", AttributeSpec::new(100.0, 0.0, 9999.0));
        schema.register(
            "hp",
            AttributeSpec::new(100.0, 0.0, 9999.0).with_dependents(Vec::new()),
        );
        // hp is bounded by max_hp
        schema.attributes.get_mut("max_hp").unwrap().dependents = vec!["hp".to_string()];
        Rc::new(schema)
    }

    #[test]
    fn layered_modifiers_add_then_multiply() {
        let mut store = AttributeStore::new(
            ActorId::new("hero"),
            schema(),
            Rc::new(RuntimeConfig::new(1)),
        );
        let mut collector = VecCollector::default();
        store
            .add_modifier(
                ModifierSpec {
                    attribute: "atk".into(),
                    source: actor_id(0),
                    operation: ModifierOp::Add,
                    value: 20.0,
                },
                &mut collector,
            )
            .unwrap();
        assert_eq!(store.get("atk").unwrap(), 70.0);
        store
            .add_modifier(
                ModifierSpec {
                    attribute: "atk".into(),
                    source: actor_id(0),
                    operation: ModifierOp::Multiply,
                    value: 2.0,
                },
                &mut collector,
            )
            .unwrap();
        assert_eq!(store.get("atk").unwrap(), 140.0);
    }

    #[test]
    fn remove_modifiers_by_source_clears_everything() {
        let mut store = AttributeStore::new(
            ActorId::new("hero"),
            schema(),
            Rc::new(RuntimeConfig::new(1)),
        );
        let mut collector = VecCollector::default();
        let source = actor_id(0);
        store
            .add_modifier(
                ModifierSpec {
                    attribute: "atk".into(),
                    source: source.clone(),
                    operation: ModifierOp::Add,
                    value: 20.0,
                },
                &mut collector,
            )
            .unwrap();
        store.remove_modifiers_by_source(&source, &mut collector);
        assert_eq!(store.get("atk").unwrap(), 50.0);
        assert_eq!(store.modifier_count_by_source(&source), 0);
    }

    #[test]
    fn hp_clamped_by_max_hp_on_write() {
        let mut store = AttributeStore::new(
            ActorId::new("hero"),
            schema(),
            Rc::new(RuntimeConfig::new(1)),
        );
        let mut collector = VecCollector::default();
        assert_eq!(store.get("hp").unwrap(), 100.0);
        store.set_base("max_hp", 50.0, &mut collector).unwrap();
        assert_eq!(store.get("hp").unwrap(), 50.0);
    }

    #[test]
    fn unknown_attribute_fails() {
        let store = AttributeStore::new(
            ActorId::new("hero"),
            schema(),
            Rc::new(RuntimeConfig::new(1)),
        );
        assert!(matches!(
            store.get("nope"),
            Err(UsageError::UnknownAttribute(_))
        ));
    }

    #[test]
    fn write_to_unregistered_attribute_fails_with_schema_missing() {
        let mut store = AttributeStore::new(
            ActorId::new("hero"),
            schema(),
            Rc::new(RuntimeConfig::new(1)),
        );
        let mut collector = VecCollector::default();
        assert!(matches!(
            store.set_base("nope", 1.0, &mut collector),
            Err(UsageError::SchemaMissing(_))
        ));
        assert!(matches!(
            store.add_modifier(
                ModifierSpec {
                    attribute: "nope".into(),
                    source: actor_id(0),
                    operation: ModifierOp::Add,
                    value: 1.0,
                },
                &mut collector,
            ),
            Err(UsageError::SchemaMissing(_))
        ));
    }
}
