//! Per-actor multiset of string tokens with three lifetime classes. §4.2.
//!
//! The three containers are stored separately and never cross-touch: a
//! manual `remove_loose_tag` call can only ever affect the loose map, auto-
//! duration entries expire only via `tick`, and component-owned entries
//! are only ever cleared by the owning ability's removal.

use std::collections::HashMap;

use crate::event::{EventCollector, GameEvent};
use crate::ids::{AbilityId, ActorId};

struct AutoDurationEntry {
    tag: String,
    expires_at: i64,
}

pub struct TagBag {
    actor: ActorId,
    loose: HashMap<String, u32>,
    auto_duration: Vec<AutoDurationEntry>,
    component_owned: HashMap<AbilityId, Vec<String>>,
}

impl TagBag {
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            loose: HashMap::new(),
            auto_duration: Vec::new(),
            component_owned: HashMap::new(),
        }
    }

    pub fn get_tag_stacks(&self, tag: &str) -> u32 {
        let loose = self.loose.get(tag).copied().unwrap_or(0);
        let auto = self.auto_duration.iter().filter(|e| e.tag == tag).count() as u32;
        let owned = self
            .component_owned
            .values()
            .flat_map(|tags| tags.iter())
            .filter(|t| t.as_str() == tag)
            .count() as u32;
        loose + auto + owned
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.get_tag_stacks(tag) > 0
    }

    fn emit_change(&self, tag: &str, old: u32, new: u32, collector: &mut dyn EventCollector) {
        if old != new {
            collector.push(GameEvent::tag_changed(self.actor.clone(), tag.to_string(), old, new));
        }
    }

    pub fn add_loose_tag(&mut self, tag: &str, stacks: u32, collector: &mut dyn EventCollector) {
        let old = self.get_tag_stacks(tag);
        *self.loose.entry(tag.to_string()).or_insert(0) += stacks.max(1);
        self.emit_change(tag, old, self.get_tag_stacks(tag), collector);
    }

    /// Removes `stacks` loose stacks of `tag` (all of them if `stacks` is
    /// `None`). Never touches auto-duration or component-owned entries.
    /// Returns `false` silently if the tag has no loose stacks.
    pub fn remove_loose_tag(
        &mut self,
        tag: &str,
        stacks: Option<u32>,
        collector: &mut dyn EventCollector,
    ) -> bool {
        let old = self.get_tag_stacks(tag);
        let Some(current) = self.loose.get_mut(tag) else {
            return false;
        };
        match stacks {
            None => {
                self.loose.remove(tag);
            }
            Some(n) => {
                if *current <= n {
                    self.loose.remove(tag);
                } else {
                    *current -= n;
                }
            }
        }
        self.emit_change(tag, old, self.get_tag_stacks(tag), collector);
        true
    }

    pub fn add_auto_duration_tag(
        &mut self,
        tag: &str,
        duration_ms: i64,
        logic_time: i64,
        collector: &mut dyn EventCollector,
    ) {
        let old = self.get_tag_stacks(tag);
        self.auto_duration.push(AutoDurationEntry {
            tag: tag.to_string(),
            expires_at: logic_time + duration_ms,
        });
        self.emit_change(tag, old, self.get_tag_stacks(tag), collector);
    }

    /// Invoked by `TagComponent::on_apply`.
    pub(crate) fn attach_component_tags(
        &mut self,
        ability: AbilityId,
        tags: Vec<String>,
        collector: &mut dyn EventCollector,
    ) {
        let befores: Vec<(String, u32)> = tags
            .iter()
            .map(|t| (t.clone(), self.get_tag_stacks(t)))
            .collect();
        self.component_owned.insert(ability, tags);
        for (tag, old) in befores {
            self.emit_change(&tag, old, self.get_tag_stacks(&tag), collector);
        }
    }

    /// Invoked by `TagComponent::on_remove`.
    pub(crate) fn detach_component_tags(&mut self, ability: &AbilityId, collector: &mut dyn EventCollector) {
        let Some(tags) = self.component_owned.remove(ability) else {
            return;
        };
        for tag in tags {
            let before = self.get_tag_stacks(&tag) + 1; // the entry we just removed
            self.emit_change(&tag, before, self.get_tag_stacks(&tag), collector);
        }
    }

    /// Sweeps expired auto-duration entries using `logic_time`, one entry
    /// per stack. Driven by the logic clock the host supplies, never by
    /// wall clock.
    pub fn tick(&mut self, logic_time: i64, collector: &mut dyn EventCollector) {
        let before: HashMap<String, u32> = self
            .auto_duration
            .iter()
            .fold(HashMap::new(), |mut acc, e| {
                *acc.entry(e.tag.clone()).or_insert(0) += 1;
                acc
            });
        self.auto_duration.retain(|e| e.expires_at > logic_time);
        let mut changed_tags: Vec<String> = before.keys().cloned().collect();
        changed_tags.sort();
        for tag in changed_tags {
            let old_auto = before.get(&tag).copied().unwrap_or(0);
            let new_auto = self.auto_duration.iter().filter(|e| e.tag == tag).count() as u32;
            if old_auto != new_auto {
                let static_stacks = self.get_tag_stacks(&tag) - new_auto;
                self.emit_change(&tag, static_stacks + old_auto, static_stacks + new_auto, collector);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::VecCollector;
    use proptest::prelude::*;

    fn bag() -> TagBag {
        TagBag::new(ActorId::new("hero"))
    }

    fn ability() -> AbilityId {
        AbilityId {
            actor: ActorId::new("hero"),
            index: 0,
            generation: 0,
        }
    }

    #[test]
    fn loose_remove_never_touches_other_classes() {
        let mut bag = bag();
        let mut collector = VecCollector::default();
        bag.add_loose_tag("burning", 2, &mut collector);
        bag.add_auto_duration_tag("burning", 1000, 0, &mut collector);
        bag.attach_component_tags(ability(), vec!["burning".into()], &mut collector);
        assert_eq!(bag.get_tag_stacks("burning"), 4);

        bag.remove_loose_tag("burning", None, &mut collector);
        assert_eq!(bag.get_tag_stacks("burning"), 2);
    }

    #[test]
    fn auto_duration_expires_on_tick() {
        let mut bag = bag();
        let mut collector = VecCollector::default();
        bag.add_auto_duration_tag("cooldown:fireball", 0, 0, &mut collector);
        assert!(bag.has_tag("cooldown:fireball"));
        bag.tick(1, &mut collector);
        assert!(!bag.has_tag("cooldown:fireball"));
    }

    #[test]
    fn component_owned_cleared_only_by_owner_removal() {
        let mut bag = bag();
        let mut collector = VecCollector::default();
        bag.attach_component_tags(ability(), vec!["shielded".into()], &mut collector);
        bag.remove_loose_tag("shielded", None, &mut collector);
        assert!(bag.has_tag("shielded"));
        bag.detach_component_tags(&ability(), &mut collector);
        assert!(!bag.has_tag("shielded"));
    }

    proptest! {
        /// "Tag class isolation": for an arbitrary interleaving of
        /// `add_loose_tag`/`add_auto_duration_tag`/`attach_component_tags`/
        /// `remove_loose_tag` on the same tag, `get_tag_stacks` always matches
        /// a shadow model that tracks the three classes independently — no
        /// operation on one class ever moves a count that belongs to another.
        #[test]
        fn tag_class_isolation_under_interleaved_ops(ops in prop::collection::vec(0u8..4, 1..40)) {
            let mut bag = bag();
            let mut collector = VecCollector::default();
            let tag = "burning";

            let mut loose_shadow: u32 = 0;
            let mut auto_shadow: u32 = 0;
            let mut owned_ids: Vec<AbilityId> = Vec::new();

            for (i, op) in ops.iter().enumerate() {
                match op % 4 {
                    0 => {
                        bag.add_loose_tag(tag, 1, &mut collector);
                        loose_shadow += 1;
                    }
                    1 => {
                        bag.add_auto_duration_tag(tag, 1_000_000, 0, &mut collector);
                        auto_shadow += 1;
                    }
                    2 => {
                        let owner = AbilityId {
                            actor: ActorId::new("hero"),
                            index: i as u32,
                            generation: 0,
                        };
                        bag.attach_component_tags(owner.clone(), vec![tag.to_string()], &mut collector);
                        owned_ids.push(owner);
                    }
                    _ => {
                        bag.remove_loose_tag(tag, None, &mut collector);
                        loose_shadow = 0;
                    }
                }

                let expected = loose_shadow + auto_shadow + owned_ids.len() as u32;
                prop_assert_eq!(bag.get_tag_stacks(tag), expected, "class counts diverged after op {}", i);
            }

            // Tearing down every class independently must account for the
            // whole remainder: nothing a class's own teardown leaked into
            // (or left behind in) another class's bookkeeping.
            bag.remove_loose_tag(tag, None, &mut collector);
            for owner in &owned_ids {
                bag.detach_component_tags(owner, &mut collector);
            }
            bag.tick(2_000_000, &mut collector);
            prop_assert_eq!(bag.get_tag_stacks(tag), 0);
        }
    }
}
