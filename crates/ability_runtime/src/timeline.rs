//! Timeline execution engine. §4.4.
//!
//! A `TimelineAsset` is a tag-offset map plus a total duration. Activating
//! it against an `Action` table produces an `ExecutionInstance`, ticked
//! alongside its owning ability. A tag fires at most once, the instant the
//! instance's elapsed time crosses its offset: `previousElapsed < offset <=
//! newElapsed`. Several instances may run against the same asset at once,
//! each with its own elapsed clock and fired-tag set.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeStore;
use crate::event::EventCollector;
use crate::host::GameplayState;
use crate::ids::{AbilityId, ActorId, ExecutionId};
use crate::tags::TagBag;

/// Immutable, shared timeline definition: named offsets (ms from
/// activation) a running instance fires as it ticks. Registered once into
/// a [`crate::registry::TimelineRegistry`] (§3 "process-wide registry").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimelineAsset {
    pub id: String,
    pub total_duration_ms: i64,
    pub tags: HashMap<String, i64>,
}

impl TimelineAsset {
    pub fn new(id: impl Into<String>, total_duration_ms: i64) -> Self {
        Self {
            id: id.into(),
            total_duration_ms,
            tags: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>, offset_ms: i64) -> Self {
        self.tags.insert(tag.into(), offset_ms);
        self
    }
}

/// Identity of the ability and actor an `ExecutionInstance` runs on behalf
/// of, threaded through to every `Action::execute` call.
#[derive(Clone, Debug)]
pub struct AbilityInfo {
    pub id: AbilityId,
    pub config_id: String,
    pub owner: ActorId,
    pub source: ActorId,
}

#[derive(Clone, Debug)]
pub struct ExecutionInfo {
    pub timeline_id: String,
    pub current_tag: String,
}

/// Everything an `Action` needs to do its work, assembled fresh for each
/// tag firing (§4.6).
pub struct ExecutionContext<'a> {
    pub event_chain: &'a [crate::event::GameEvent],
    pub gameplay_state: &'a dyn GameplayState,
    pub event_collector: &'a mut dyn EventCollector,
    pub owner_tags: &'a mut TagBag,
    pub owner_attributes: &'a mut AttributeStore,
    pub ability: AbilityInfo,
    pub execution: ExecutionInfo,
    pub targets: &'a [ActorId],
}

/// A polymorphic unit of work bound to a timeline tag. The crate ships a
/// small built-in set (below); hosts add their own by implementing this
/// trait directly, the boxed trait-object tail the core leaves open for
/// gameplay-specific effects.
pub trait Action {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), String>;
}

/// Per-activation binding of tags to the actions that should run when they
/// fire. Kept as an ordered list rather than a `HashMap` so resolution
/// order (and therefore which wildcard wins when several could match) is
/// deterministic and reproducible.
pub type TagActions = Vec<(String, Vec<Box<dyn Action>>)>;

/// Pattern matching for `tagActions` keys: an exact key always matches
/// only itself. A key ending in `*` matches any tag that has the text
/// before the `*` as a strict, non-empty-suffix prefix — e.g. `"damage_*"`
/// matches `"damage_phys"` and `"damage_magic"` but not `"damage"` itself.
/// This is a literal prefix check, not a regex, and not the abstract
/// "insert an extra separator" reading one could take from the grammar
/// name alone — see DESIGN.md for why.
fn wildcard_matches(pattern: &str, tag: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => tag.len() > prefix.len() && tag.starts_with(prefix),
        None => false,
    }
}

fn resolve_actions<'a>(tag_actions: &'a TagActions, tag: &str) -> Option<&'a [Box<dyn Action>]> {
    if let Some((_, actions)) = tag_actions.iter().find(|(pattern, _)| pattern == tag) {
        return Some(actions.as_slice());
    }
    tag_actions
        .iter()
        .find(|(pattern, _)| wildcard_matches(pattern, tag))
        .map(|(_, actions)| actions.as_slice())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionState {
    Executing,
    Completed,
    Cancelled,
}

/// One running instantiation of a `TimelineAsset`. Several may be active
/// for the same asset concurrently, each independent.
pub struct ExecutionInstance {
    pub id: ExecutionId,
    timeline_id: String,
    tag_actions: TagActions,
    event_chain: Vec<crate::event::GameEvent>,
    elapsed: i64,
    fired_tags: std::collections::HashSet<String>,
    state: ExecutionState,
    ability: AbilityInfo,
    targets: Vec<ActorId>,
    zero_offset_inclusive: bool,
}

impl ExecutionInstance {
    pub fn new(
        id: ExecutionId,
        timeline_id: String,
        tag_actions: TagActions,
        ability: AbilityInfo,
        targets: Vec<ActorId>,
    ) -> Self {
        Self::with_config(id, timeline_id, tag_actions, ability, targets, false)
    }

    /// Resolution of §9 Open Question 1: `zero_offset_inclusive` opts into
    /// firing an offset-0 tag on the very first tick; default (`false`)
    /// preserves the strict `previousElapsed < offset` behavior.
    pub fn with_config(
        id: ExecutionId,
        timeline_id: String,
        tag_actions: TagActions,
        ability: AbilityInfo,
        targets: Vec<ActorId>,
        zero_offset_inclusive: bool,
    ) -> Self {
        Self {
            id,
            timeline_id,
            tag_actions,
            event_chain: Vec::new(),
            elapsed: 0,
            fired_tags: std::collections::HashSet::new(),
            state: ExecutionState::Executing,
            ability,
            targets,
            zero_offset_inclusive,
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn cancel(&mut self) {
        if self.state == ExecutionState::Executing {
            self.state = ExecutionState::Cancelled;
        }
    }

    /// Advances the instance by `dt_ms`. `asset` is `None` when the
    /// timeline has gone missing from the registry since activation: the
    /// instance produces no firings and completes immediately (§4.4 edge
    /// case), logged once.
    /// Returns the names of tags that fired during this step, in
    /// non-decreasing order of offset (§8 "tag firing exactness").
    pub fn tick(
        &mut self,
        dt_ms: i64,
        asset: Option<&TimelineAsset>,
        owner_tags: &mut TagBag,
        owner_attributes: &mut AttributeStore,
        gameplay_state: &dyn GameplayState,
        collector: &mut dyn EventCollector,
    ) -> Vec<String> {
        if self.state != ExecutionState::Executing {
            return Vec::new();
        }

        let Some(asset) = asset else {
            tracing::warn!(
                target: "ability_runtime::timeline",
                timeline = %self.timeline_id,
                execution = %self.id,
                "timeline asset missing from registry, completing with no firings"
            );
            self.state = ExecutionState::Completed;
            return Vec::new();
        };

        let previous = self.elapsed;
        self.elapsed += dt_ms;

        let mut due: Vec<(String, i64)> = asset
            .tags
            .iter()
            .filter(|(tag, &offset)| {
                let lower_bound_ok = if self.zero_offset_inclusive && offset == 0 {
                    previous <= offset
                } else {
                    previous < offset
                };
                lower_bound_ok && offset <= self.elapsed && !self.fired_tags.contains(*tag)
            })
            .map(|(tag, &offset)| (tag.clone(), offset))
            .collect();
        due.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let fired: Vec<String> = due.iter().map(|(tag, _)| tag.clone()).collect();

        for (tag, _offset) in due {
            self.fired_tags.insert(tag.clone());
            let Some(actions) = resolve_actions(&self.tag_actions, &tag) else {
                continue;
            };
            for action in actions {
                let mut ctx = ExecutionContext {
                    event_chain: &self.event_chain,
                    gameplay_state,
                    event_collector: collector,
                    owner_tags,
                    owner_attributes,
                    ability: self.ability.clone(),
                    execution: ExecutionInfo {
                        timeline_id: self.timeline_id.clone(),
                        current_tag: tag.clone(),
                    },
                    targets: &self.targets,
                };
                if let Err(message) = action.execute(&mut ctx) {
                    tracing::error!(
                        target: "ability_runtime::timeline",
                        timeline = %self.timeline_id,
                        tag = %tag,
                        %message,
                        "timeline action failed, continuing"
                    );
                }
            }
        }

        if self.elapsed >= asset.total_duration_ms {
            self.state = ExecutionState::Completed;
        }

        fired
    }

    pub fn with_event_chain(mut self, chain: Vec<crate::event::GameEvent>) -> Self {
        self.event_chain = chain;
        self
    }

    pub fn timeline_id(&self) -> &str {
        &self.timeline_id
    }
}

// --- Built-in actions (§4.4) ---
//
// These operate on the owning actor's own tag bag. Effects that must
// reach other actors (a victim, an area of targets) are host concerns,
// resolved through `ExecutionContext::gameplay_state` by host-supplied
// actions — the core does not hand out mutable access to arbitrary
// actors' state from inside a tick.

pub struct ApplyTagAction {
    pub tag: String,
    pub stacks: u32,
}

impl Action for ApplyTagAction {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), String> {
        ctx.owner_tags
            .add_loose_tag(&self.tag, self.stacks, ctx.event_collector);
        Ok(())
    }
}

pub struct ApplyAutoDurationTagAction {
    pub tag: String,
    pub duration_ms: i64,
}

impl Action for ApplyAutoDurationTagAction {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), String> {
        let logic_time = ctx.gameplay_state.logic_time();
        ctx.owner_tags
            .add_auto_duration_tag(&self.tag, self.duration_ms, logic_time, ctx.event_collector);
        Ok(())
    }
}

pub struct RemoveTagAction {
    pub tag: String,
    pub stacks: Option<u32>,
}

impl Action for RemoveTagAction {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), String> {
        ctx.owner_tags
            .remove_loose_tag(&self.tag, self.stacks, ctx.event_collector);
        Ok(())
    }
}

pub struct EmitEventAction {
    pub event: crate::event::GameEvent,
}

impl Action for EmitEventAction {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), String> {
        ctx.event_collector.push(self.event.clone());
        Ok(())
    }
}

/// Resolution of §9 Open Question 3: the built-in branch checks the
/// owning actor's tag bag and runs exactly one side. Fan-out across a
/// target list, if a host needs it, belongs to a host-supplied `Action`
/// that iterates `ctx.targets` itself — the core does not attempt to
/// thread separate per-target branch outcomes through one tick.
pub struct HasTagAction {
    pub tag: String,
    pub then: Vec<Box<dyn Action>>,
    pub or_else: Vec<Box<dyn Action>>,
}

impl Action for HasTagAction {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), String> {
        let branch = if ctx.owner_tags.has_tag(&self.tag) {
            &self.then
        } else {
            &self.or_else
        };
        for action in branch {
            action.execute(ctx)?;
        }
        Ok(())
    }
}

/// Demonstrates the host-extension path (§9 "accept a boxed trait-object
/// tail") for the teacher's `AbilityEffect::Buff` — a temporary stat
/// modifier applied to the owning actor. Unlike the teacher's Bevy
/// component, which a dedicated per-tick system counts down and removes,
/// this modifier is ability-scoped: it lives until the owning ability
/// expires or is revoked, at which point `AbilitySet::revoke`/`Ability::expire`
/// sweep every modifier the ability sourced (§8 "modifier cleanup"). A host
/// wanting a fixed-duration buff pairs this action with a
/// `TimeDurationComponent` set to the same duration.
pub struct BuffAction {
    pub attribute: String,
    pub operation: crate::attribute::ModifierOp,
    pub value: f64,
}

impl Action for BuffAction {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), String> {
        ctx.owner_attributes
            .add_modifier(
                crate::attribute::ModifierSpec {
                    attribute: self.attribute.clone(),
                    source: ctx.ability.id.clone(),
                    operation: self.operation,
                    value: self.value,
                },
                ctx.event_collector,
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// The host-extension counterpart to `BuffAction`, grounded in the
/// teacher's `AbilityEffect::Shield` — grants a damage-absorbing pool by
/// adding to a host-declared attribute (e.g. `shield`), rather than the
/// teacher's dedicated `ActiveShield` component, since this core has no
/// component type of its own for an absorb pool: any numeric pool the host
/// wants is just another schema attribute. Cleanup follows `BuffAction`'s.
pub struct ShieldAction {
    pub attribute: String,
    pub absorb: f64,
}

impl Action for ShieldAction {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), String> {
        ctx.owner_attributes
            .add_modifier(
                crate::attribute::ModifierSpec {
                    attribute: self.attribute.clone(),
                    source: ctx.ability.id.clone(),
                    operation: crate::attribute::ModifierOp::Add,
                    value: self.absorb,
                },
                ctx.event_collector,
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
