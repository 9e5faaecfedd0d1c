//! Ability and component model. §4.3, §4.4.
//!
//! The core component catalog is a closed sum type dispatched by a single
//! match in each lifecycle method (cheap, monomorphizable, hot path); a
//! `Custom` variant wraps a boxed trait object for host-defined components
//! (rare, cold, fine to pay dynamic dispatch for) — see the "Dynamic
//! dispatch" design note.

use std::collections::HashSet;

use crate::arena::{Arena, GenIndex};
use crate::attribute::{AttributeStore, ModifierId, ModifierOp, ModifierSpec};
use crate::config::{AttributeSchema, RuntimeConfig};
use crate::event::{EventCollector, EventFilter, EventPipeline, GameEvent, PreHandlerResult, PreHandlerSpec};
use crate::host::GameplayState;
use crate::ids::{AbilityId, ActorId, PreHandlerId};
use crate::registry::TimelineRegistry;
use crate::tags::TagBag;
use crate::timeline::{AbilityInfo, ExecutionInstance, ExecutionState, TagActions};

/// Everything a component lifecycle hook needs. Constructed fresh for
/// each call rather than stored on the component, so components never
/// hold a back-reference into their owning `AbilitySet` (the "cyclic
/// references" design note).
pub struct ComponentCtx<'a> {
    pub attributes: &'a mut AttributeStore,
    pub tags: &'a mut TagBag,
    pub pipeline: &'a mut EventPipeline,
    pub collector: &'a mut dyn EventCollector,
    pub gameplay_state: &'a dyn GameplayState,
    pub ability: AbilityInfo,
    pub activation_requests: &'a mut Vec<ActivationRequest>,
    pub config: std::rc::Rc<RuntimeConfig>,
}

/// Queued by `ActivateInstanceComponent::on_event`; drained by the owning
/// `Ability` into a freshly spawned `ExecutionInstance` after the full
/// post-phase component pass completes.
pub struct ActivationRequest {
    pub timeline_id: String,
    pub tag_actions: TagActions,
    pub targets: Vec<ActorId>,
    pub event_chain: Vec<GameEvent>,
    pub zero_offset_inclusive: bool,
}

/// A host-defined component. Default no-op bodies mean a host only
/// overrides the hooks it needs. Every hook is fallible: an `Err` is a
/// "RuntimeError inside a component callback" (§7) — caught by the
/// dispatcher, logged, and otherwise treated as that hook's no-op default.
/// It never aborts the tick and never forces the owning ability to expire.
pub trait CustomComponent {
    fn on_apply(&mut self, _ctx: &mut ComponentCtx) -> Result<(), String> {
        Ok(())
    }
    /// Returning `Ok(Some(reason))` requests that the owning ability expire.
    fn on_tick(&mut self, _dt_ms: i64, _ctx: &mut ComponentCtx) -> Result<Option<String>, String> {
        Ok(None)
    }
    /// Returns whether this component reacted to the event.
    fn on_event(&mut self, _event: &GameEvent, _ctx: &mut ComponentCtx) -> Result<bool, String> {
        Ok(false)
    }
    fn on_remove(&mut self, _ctx: &mut ComponentCtx) -> Result<(), String> {
        Ok(())
    }
    fn type_name(&self) -> &'static str;
}

pub struct TimeDurationComponent {
    pub duration_ms: i64,
    elapsed_ms: i64,
}

impl TimeDurationComponent {
    pub fn new(duration_ms: i64) -> Self {
        Self {
            duration_ms,
            elapsed_ms: 0,
        }
    }
}

pub struct StatModifierComponent {
    pub attribute: String,
    pub operation: ModifierOp,
    pub value: f64,
    modifier_id: Option<ModifierId>,
}

impl StatModifierComponent {
    pub fn new(attribute: impl Into<String>, operation: ModifierOp, value: f64) -> Self {
        Self {
            attribute: attribute.into(),
            operation,
            value,
            modifier_id: None,
        }
    }
}

pub struct TagComponent {
    pub tags: Vec<String>,
}

impl TagComponent {
    pub fn new(tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

/// A reaction closure run when a `GameEventComponent`'s filter matches.
/// Returns whether the event was claimed.
pub type ReactionFn = Box<dyn FnMut(&GameEvent, &mut ComponentCtx) -> bool>;

pub struct GameEventComponent {
    pub event_kind: String,
    pub filter: Option<EventFilter>,
    pub reaction: ReactionFn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerMode {
    Any,
    All,
}

pub struct ActivateInstanceComponent {
    pub triggers: Vec<(String, Option<EventFilter>)>,
    pub mode: TriggerMode,
    pub timeline_id: String,
    pub tag_actions_factory: Box<dyn Fn() -> TagActions>,
    pub zero_offset_inclusive: bool,
    seen: HashSet<String>,
}

impl ActivateInstanceComponent {
    pub fn new(
        triggers: Vec<(String, Option<EventFilter>)>,
        mode: TriggerMode,
        timeline_id: impl Into<String>,
        tag_actions_factory: Box<dyn Fn() -> TagActions>,
    ) -> Self {
        Self {
            triggers,
            mode,
            timeline_id: timeline_id.into(),
            tag_actions_factory,
            zero_offset_inclusive: false,
            seen: HashSet::new(),
        }
    }
}

pub struct PreEventComponent {
    pub event_kind: String,
    pub filter: Option<EventFilter>,
    pub handler: Box<dyn FnMut(&mut GameEvent) -> PreHandlerResult>,
    registered_id: Option<PreHandlerId>,
}

impl PreEventComponent {
    pub fn new(
        event_kind: impl Into<String>,
        filter: Option<EventFilter>,
        handler: Box<dyn FnMut(&mut GameEvent) -> PreHandlerResult>,
    ) -> Self {
        Self {
            event_kind: event_kind.into(),
            filter,
            handler,
            registered_id: None,
        }
    }
}

pub enum CostKind {
    /// Adds an auto-duration tag `cooldown:{configId}` for `duration_ms`.
    Cooldown { duration_ms: i64 },
    ConsumeTag { tag: String, stacks: u32 },
    AddTag { tag: String, stacks: u32 },
    RemoveTag { tag: String, stacks: Option<u32> },
}

/// A gating condition for `ActiveUseComponent::can_use`/`use_now`.
pub type UseCondition = Box<dyn Fn(&AttributeStore, &TagBag) -> Result<(), String>>;

pub struct ActiveUseComponent {
    pub conditions: Vec<UseCondition>,
    pub costs: Vec<CostKind>,
    pub on_use: Box<dyn FnMut(&mut ComponentCtx)>,
}

fn cooldown_tag(config_id: &str) -> String {
    format!("cooldown:{config_id}")
}

impl ActiveUseComponent {
    /// `canUse`: tests conditions and cost availability without paying.
    pub fn can_use(&self, config_id: &str, attributes: &AttributeStore, tags: &TagBag) -> Result<(), String> {
        for condition in &self.conditions {
            condition(attributes, tags)?;
        }
        for cost in &self.costs {
            match cost {
                CostKind::Cooldown { .. } => {
                    if tags.has_tag(&cooldown_tag(config_id)) {
                        return Err(format!("{} is on cooldown", config_id));
                    }
                }
                CostKind::ConsumeTag { tag, stacks } => {
                    if tags.get_tag_stacks(tag) < *stacks {
                        return Err(format!("missing {stacks} stacks of tag {tag}"));
                    }
                }
                CostKind::AddTag { .. } | CostKind::RemoveTag { .. } => {}
            }
        }
        Ok(())
    }

    /// Pays costs in order, then invokes `on_use`.
    pub fn use_now(&mut self, config_id: &str, logic_time: i64, ctx: &mut ComponentCtx) -> Result<(), String> {
        self.can_use(config_id, ctx.attributes, ctx.tags)?;
        for cost in &self.costs {
            match cost {
                CostKind::Cooldown { duration_ms } => {
                    ctx.tags
                        .add_auto_duration_tag(&cooldown_tag(config_id), *duration_ms, logic_time, ctx.collector);
                }
                CostKind::ConsumeTag { tag, stacks } => {
                    ctx.tags.remove_loose_tag(tag, Some(*stacks), ctx.collector);
                }
                CostKind::AddTag { tag, stacks } => {
                    ctx.tags.add_loose_tag(tag, *stacks, ctx.collector);
                }
                CostKind::RemoveTag { tag, stacks } => {
                    ctx.tags.remove_loose_tag(tag, *stacks, ctx.collector);
                }
            }
        }
        (self.on_use)(ctx);
        Ok(())
    }
}

/// The closed core catalog plus the host-extension tail.
pub enum Component {
    TimeDuration(TimeDurationComponent),
    StatModifier(StatModifierComponent),
    Tag(TagComponent),
    GameEvent(GameEventComponent),
    ActivateInstance(ActivateInstanceComponent),
    PreEvent(PreEventComponent),
    ActiveUse(ActiveUseComponent),
    Custom(Box<dyn CustomComponent>),
}

impl Component {
    pub fn type_name(&self) -> &'static str {
        match self {
            Component::TimeDuration(_) => "TimeDurationComponent",
            Component::StatModifier(_) => "StatModifierComponent",
            Component::Tag(_) => "TagComponent",
            Component::GameEvent(_) => "GameEventComponent",
            Component::ActivateInstance(_) => "ActivateInstanceComponent",
            Component::PreEvent(_) => "PreEventComponent",
            Component::ActiveUse(_) => "ActiveUseComponent",
            Component::Custom(c) => c.type_name(),
        }
    }

    fn on_apply(&mut self, ctx: &mut ComponentCtx, component_index: usize) {
        match self {
            Component::StatModifier(s) => {
                let id = ctx
                    .attributes
                    .add_modifier(
                        ModifierSpec {
                            attribute: s.attribute.clone(),
                            source: ctx.ability.id.clone(),
                            operation: s.operation,
                            value: s.value,
                        },
                        ctx.collector,
                    )
                    .ok();
                s.modifier_id = id;
            }
            Component::Tag(t) => {
                ctx.tags
                    .attach_component_tags(ctx.ability.id.clone(), t.tags.clone(), ctx.collector);
            }
            Component::PreEvent(p) => {
                let id = PreHandlerId {
                    ability: ctx.ability.id.clone(),
                    component_index,
                };
                ctx.pipeline.register_pre_handler(PreHandlerSpec {
                    id: id.clone(),
                    event_kind: p.event_kind.clone(),
                    owner: ctx.ability.owner.clone(),
                    ability: ctx.ability.id.clone(),
                    config_id: ctx.ability.config_id.clone(),
                    filter: p.filter.take(),
                    handler: std::mem::replace(&mut p.handler, Box::new(|_| Ok(crate::event::Intent::Pass))),
                });
                p.registered_id = Some(id);
            }
            Component::Custom(c) => {
                if let Err(message) = c.on_apply(ctx) {
                    log_callback_error(c.type_name(), &ctx.ability.id, None, message);
                }
            }
            Component::TimeDuration(_)
            | Component::GameEvent(_)
            | Component::ActivateInstance(_)
            | Component::ActiveUse(_) => {}
        }
    }

    fn on_tick(&mut self, dt_ms: i64, ctx: &mut ComponentCtx) -> Option<String> {
        match self {
            Component::TimeDuration(t) => {
                t.elapsed_ms += dt_ms;
                if t.elapsed_ms >= t.duration_ms {
                    Some("time_duration".to_string())
                } else {
                    None
                }
            }
            Component::Custom(c) => match c.on_tick(dt_ms, ctx) {
                Ok(expire_request) => expire_request,
                Err(message) => {
                    log_callback_error(c.type_name(), &ctx.ability.id, None, message);
                    None
                }
            },
            _ => None,
        }
    }

    fn on_event(&mut self, event: &GameEvent, ctx: &mut ComponentCtx) -> bool {
        match self {
            Component::GameEvent(g) => {
                if g.event_kind != event.kind {
                    return false;
                }
                if let Some(filter) = &g.filter {
                    if !filter(event) {
                        return false;
                    }
                }
                (g.reaction)(event, ctx)
            }
            Component::ActivateInstance(a) => {
                let triggered = match a.mode {
                    TriggerMode::Any => a.triggers.iter().any(|(kind, filter)| {
                        kind == &event.kind && filter.as_ref().map(|f| f(event)).unwrap_or(true)
                    }),
                    TriggerMode::All => {
                        for (kind, filter) in &a.triggers {
                            if kind == &event.kind && filter.as_ref().map(|f| f(event)).unwrap_or(true) {
                                a.seen.insert(kind.clone());
                            }
                        }
                        let all_seen = a.triggers.iter().all(|(kind, _)| a.seen.contains(kind));
                        if all_seen {
                            a.seen.clear();
                        }
                        all_seen
                    }
                };
                if triggered {
                    ctx.activation_requests.push(ActivationRequest {
                        timeline_id: a.timeline_id.clone(),
                        tag_actions: (a.tag_actions_factory)(),
                        targets: Vec::new(),
                        event_chain: vec![event.clone()],
                        zero_offset_inclusive: a.zero_offset_inclusive
                            || ctx.config.timeline_zero_offset_inclusive,
                    });
                }
                triggered
            }
            Component::Custom(c) => match c.on_event(event, ctx) {
                Ok(claimed) => claimed,
                Err(message) => {
                    log_callback_error(c.type_name(), &ctx.ability.id, Some(event.kind.clone()), message);
                    false
                }
            },
            _ => false,
        }
    }

    fn on_remove(&mut self, ctx: &mut ComponentCtx) {
        match self {
            Component::StatModifier(s) => {
                if let Some(id) = s.modifier_id.take() {
                    ctx.attributes.remove_modifier(&s.attribute, id, ctx.collector);
                }
            }
            Component::Tag(_) => {
                ctx.tags.detach_component_tags(&ctx.ability.id, ctx.collector);
            }
            Component::PreEvent(p) => {
                if let Some(id) = p.registered_id.take() {
                    ctx.pipeline.unregister_pre_handler(&id);
                }
            }
            Component::Custom(c) => {
                if let Err(message) = c.on_remove(ctx) {
                    log_callback_error(c.type_name(), &ctx.ability.id, None, message);
                }
            }
            Component::TimeDuration(_)
            | Component::GameEvent(_)
            | Component::ActivateInstance(_)
            | Component::ActiveUse(_) => {}
        }
    }
}

/// §7 "RuntimeErrors inside a component callback": logged with
/// `{componentType, abilityId, event.kind?}`, never propagated.
fn log_callback_error(component_type: &'static str, ability: &AbilityId, event_kind: Option<String>, message: String) {
    let error = crate::error::RuntimeCallbackError {
        component_type,
        ability: ability.clone(),
        event_kind,
        message,
    };
    tracing::error!(target: "ability_runtime::ability", %error, "component callback error, continuing");
}

/// Host-facing construction payload for `AbilitySet::grant` (§6.1).
/// `tags` here are free-form categorization tags used by `find_by_tag`,
/// distinct from the per-actor tag bag a `TagComponent` writes into.
pub struct AbilityConfig {
    pub config_id: String,
    pub display_name: Option<String>,
    pub components: Vec<Component>,
    pub source: Option<ActorId>,
    pub tags: Vec<String>,
}

impl AbilityConfig {
    pub fn new(config_id: impl Into<String>) -> Self {
        Self {
            config_id: config_id.into(),
            display_name: None,
            components: Vec::new(),
            source: None,
            tags: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbilityState {
    Pending,
    Granted,
    Expired,
}

pub struct Ability {
    pub id: AbilityId,
    pub config_id: String,
    pub display_name: Option<String>,
    pub owner: ActorId,
    pub source: ActorId,
    pub tags: Vec<String>,
    components: Vec<Component>,
    executions: Vec<ExecutionInstance>,
    next_execution_seq: u32,
    state: AbilityState,
    expire_reason: Option<String>,
}

impl Ability {
    fn new(id: AbilityId, owner: ActorId, config: AbilityConfig) -> Self {
        let source = config.source.unwrap_or_else(|| owner.clone());
        Self {
            id,
            config_id: config.config_id,
            display_name: config.display_name,
            owner,
            source,
            tags: config.tags,
            components: config.components,
            executions: Vec::new(),
            next_execution_seq: 0,
            state: AbilityState::Pending,
            expire_reason: None,
        }
    }

    pub fn state(&self) -> AbilityState {
        self.state
    }

    pub fn expire_reason(&self) -> Option<&str> {
        self.expire_reason.as_deref()
    }

    pub fn info(&self) -> AbilityInfo {
        AbilityInfo {
            id: self.id.clone(),
            config_id: self.config_id.clone(),
            owner: self.owner.clone(),
            source: self.source.clone(),
        }
    }

    /// Idempotent against re-apply: a second call warns and is a no-op.
    pub fn apply_effects(&mut self, ctx: &mut ComponentCtx) {
        if self.state != AbilityState::Pending {
            tracing::warn!(
                target: "ability_runtime::ability",
                ability = %self.id,
                "apply_effects called on an already-applied ability, ignoring"
            );
            return;
        }
        for (index, component) in self.components.iter_mut().enumerate() {
            component.on_apply(ctx, index);
        }
        self.state = AbilityState::Granted;
    }

    /// Safe to call even if `apply_effects` was never invoked. Sweeps every
    /// attribute modifier sourced from this ability afterward, catching
    /// modifiers a timeline action (`BuffAction`/`ShieldAction`) added
    /// outside the component lifecycle, on top of each component's own
    /// `on_remove` cleanup.
    pub fn remove_effects(&mut self, ctx: &mut ComponentCtx) {
        for component in &mut self.components {
            component.on_remove(ctx);
        }
        ctx.attributes.remove_modifiers_by_source(&self.id, ctx.collector);
    }

    /// First call wins for `reason`; later calls are no-ops (§3 "Expiry
    /// conflicts").
    pub fn expire(&mut self, reason: impl Into<String>, ctx: &mut ComponentCtx) {
        if self.expire_reason.is_some() {
            return;
        }
        self.expire_reason = Some(reason.into());
        self.remove_effects(ctx);
        self.state = AbilityState::Expired;
        for execution in &mut self.executions {
            execution.cancel();
        }
    }

    pub fn tick(&mut self, dt_ms: i64, ctx: &mut ComponentCtx) {
        if self.state != AbilityState::Granted {
            return;
        }
        let mut expire_request: Option<String> = None;
        for component in &mut self.components {
            if let Some(reason) = component.on_tick(dt_ms, ctx) {
                if expire_request.is_none() {
                    expire_request = Some(reason);
                }
            }
        }
        if let Some(reason) = expire_request {
            self.expire(reason, ctx);
        }
    }

    /// Advances every execution instance, prunes completed/cancelled
    /// ones, and returns the union of tag names fired this tick.
    pub fn tick_executions(
        &mut self,
        dt_ms: i64,
        timelines: &TimelineRegistry,
        tags: &mut TagBag,
        attributes: &mut AttributeStore,
        gameplay_state: &dyn GameplayState,
        collector: &mut dyn EventCollector,
    ) -> Vec<String> {
        let mut fired = Vec::new();
        for execution in &mut self.executions {
            let asset = timelines.get(execution.timeline_id());
            fired.extend(execution.tick(dt_ms, asset, tags, attributes, gameplay_state, collector));
        }
        self.executions
            .retain(|e| e.state() == ExecutionState::Executing);
        fired
    }

    /// Dispatches post phase to every component; drains any activation
    /// requests queued during the pass into freshly spawned execution
    /// instances. Returns the component type names that claimed the
    /// event.
    pub fn receive_event(&mut self, event: &GameEvent, ctx: &mut ComponentCtx) -> Vec<&'static str> {
        let mut claimed = Vec::new();
        for component in &mut self.components {
            if component.on_event(event, ctx) {
                claimed.push(component.type_name());
            }
        }
        let requests = std::mem::take(ctx.activation_requests);
        for request in requests {
            self.activate_new_execution_instance(request);
        }
        claimed
    }

    pub fn activate_new_execution_instance(&mut self, request: ActivationRequest) -> crate::ids::ExecutionId {
        let seq = self.next_execution_seq;
        self.next_execution_seq += 1;
        let id = crate::ids::ExecutionId {
            ability: self.id.clone(),
            seq,
        };
        let instance = ExecutionInstance::with_config(
            id.clone(),
            request.timeline_id,
            request.tag_actions,
            self.info(),
            request.targets,
            request.zero_offset_inclusive,
        )
        .with_event_chain(request.event_chain);
        self.executions.push(instance);
        id
    }

    pub fn has_component<F: Fn(&Component) -> bool>(&self, predicate: F) -> bool {
        self.components.iter().any(predicate)
    }
}

/// Per-actor container: granted abilities, tag bag, and attribute store
/// (§3 "AttributeStore owned by the Actor handle"; simplified here so
/// `AbilitySet` owns both directly, since in this crate one `AbilitySet`
/// corresponds to exactly one actor — see DESIGN.md).
pub struct AbilitySet {
    actor: ActorId,
    abilities: Arena<Ability>,
    grant_order: Vec<GenIndex>,
    pub tags: TagBag,
    pub attributes: AttributeStore,
    config: std::rc::Rc<RuntimeConfig>,
}

impl AbilitySet {
    pub fn new(
        actor: ActorId,
        schema: std::rc::Rc<AttributeSchema>,
        config: std::rc::Rc<RuntimeConfig>,
    ) -> Self {
        Self {
            attributes: AttributeStore::new(actor.clone(), schema, config.clone()),
            tags: TagBag::new(actor.clone()),
            abilities: Arena::new(),
            grant_order: Vec::new(),
            actor,
            config,
        }
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn grant(
        &mut self,
        config: AbilityConfig,
        pipeline: &mut EventPipeline,
        collector: &mut dyn EventCollector,
        gameplay_state: &dyn GameplayState,
    ) -> AbilityId {
        let placeholder = AbilityId {
            actor: self.actor.clone(),
            index: 0,
            generation: 0,
        };
        let ability = Ability::new(placeholder, self.actor.clone(), config);
        let gen_index = self.abilities.insert(ability);
        let ability_id = AbilityId {
            actor: self.actor.clone(),
            index: gen_index.index,
            generation: gen_index.generation,
        };
        let config_id = {
            let ability = self.abilities.get_mut(gen_index).expect("just inserted");
            ability.id = ability_id.clone();
            ability.config_id.clone()
        };
        self.grant_order.push(gen_index);

        let AbilitySet {
            abilities,
            attributes,
            tags,
            config,
            ..
        } = self;
        let ability = abilities.get_mut(gen_index).expect("just inserted");
        let mut requests = Vec::new();
        let info = ability.info();
        {
            let mut ctx = ComponentCtx {
                attributes,
                tags,
                pipeline,
                collector,
                gameplay_state,
                ability: info,
                activation_requests: &mut requests,
                config: config.clone(),
            };
            ability.apply_effects(&mut ctx);
        }
        collector.push(GameEvent::ability_granted(self.actor.clone(), &ability_id, &config_id));
        ability_id
    }

    pub fn revoke(
        &mut self,
        id: &AbilityId,
        reason: impl Into<String>,
        pipeline: &mut EventPipeline,
        collector: &mut dyn EventCollector,
        gameplay_state: &dyn GameplayState,
    ) -> bool {
        let gen_index = GenIndex {
            index: id.index,
            generation: id.generation,
        };
        let AbilitySet {
            abilities,
            attributes,
            tags,
            grant_order,
            actor,
            config,
            ..
        } = self;
        let Some(ability) = abilities.get_mut(gen_index) else {
            return false;
        };
        let info = ability.info();
        let mut requests = Vec::new();
        {
            let mut ctx = ComponentCtx {
                attributes,
                tags,
                pipeline,
                collector,
                gameplay_state,
                ability: info,
                activation_requests: &mut requests,
                config: config.clone(),
            };
            ability.expire(reason, &mut ctx);
        }
        let config_id = ability.config_id.clone();
        let expire_reason = ability.expire_reason().unwrap_or("").to_string();
        collector.push(GameEvent::ability_revoked(actor.clone(), id, &config_id, &expire_reason));
        abilities.remove(gen_index);
        grant_order.retain(|gi| gi != &gen_index);
        true
    }

    pub fn revoke_by_config_id(
        &mut self,
        config_id: &str,
        reason: &str,
        pipeline: &mut EventPipeline,
        collector: &mut dyn EventCollector,
        gameplay_state: &dyn GameplayState,
    ) -> usize {
        let ids: Vec<AbilityId> = self
            .abilities
            .iter()
            .filter(|(_, a)| a.config_id == config_id)
            .map(|(_, a)| a.id.clone())
            .collect();
        let mut count = 0;
        for id in ids {
            if self.revoke(&id, reason.to_string(), pipeline, collector, gameplay_state) {
                count += 1;
            }
        }
        count
    }

    pub fn revoke_by_tag(
        &mut self,
        tag: &str,
        reason: &str,
        pipeline: &mut EventPipeline,
        collector: &mut dyn EventCollector,
        gameplay_state: &dyn GameplayState,
    ) -> usize {
        let ids: Vec<AbilityId> = self
            .abilities
            .iter()
            .filter(|(_, a)| a.tags.iter().any(|t| t == tag))
            .map(|(_, a)| a.id.clone())
            .collect();
        let mut count = 0;
        for id in ids {
            if self.revoke(&id, reason.to_string(), pipeline, collector, gameplay_state) {
                count += 1;
            }
        }
        count
    }

    pub fn find_by_id(&self, id: &AbilityId) -> Option<&Ability> {
        let gen_index = GenIndex {
            index: id.index,
            generation: id.generation,
        };
        self.abilities.get(gen_index)
    }

    pub fn find_by_config_id(&self, config_id: &str) -> Vec<&Ability> {
        self.abilities
            .iter()
            .filter(|(_, a)| a.config_id == config_id)
            .map(|(_, a)| a)
            .collect()
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<&Ability> {
        self.abilities
            .iter()
            .filter(|(_, a)| a.tags.iter().any(|t| t == tag))
            .map(|(_, a)| a)
            .collect()
    }

    pub fn has_ability(&self, config_id: &str) -> bool {
        self.abilities.iter().any(|(_, a)| a.config_id == config_id)
    }

    /// Tag timer sweep, then ticks every granted ability in grant order,
    /// then sweeps those that expired as a result.
    pub fn tick(
        &mut self,
        dt_ms: i64,
        logic_time: i64,
        pipeline: &mut EventPipeline,
        collector: &mut dyn EventCollector,
        gameplay_state: &dyn GameplayState,
    ) {
        self.tags.tick(logic_time, collector);

        let AbilitySet {
            abilities,
            attributes,
            tags,
            grant_order,
            config,
            ..
        } = self;

        let mut expired = Vec::new();
        for &gen_index in grant_order.iter() {
            let Some(ability) = abilities.get_mut(gen_index) else {
                continue;
            };
            let info = ability.info();
            let mut requests = Vec::new();
            {
                let mut ctx = ComponentCtx {
                    attributes,
                    tags,
                    pipeline,
                    collector,
                    gameplay_state,
                    ability: info,
                    activation_requests: &mut requests,
                    config: config.clone(),
                };
                ability.tick(dt_ms, &mut ctx);
            }
            if ability.state() == AbilityState::Expired {
                expired.push(gen_index);
            }
        }
        for gen_index in expired {
            if let Some(ability) = abilities.get_mut(gen_index) {
                let config_id = ability.config_id.clone();
                let reason = ability.expire_reason().unwrap_or("").to_string();
                let id = ability.id.clone();
                collector.push(GameEvent::ability_revoked(self.actor.clone(), &id, &config_id, &reason));
            }
            abilities.remove(gen_index);
            grant_order.retain(|gi| gi != &gen_index);
        }
    }

    /// Advances every execution instance across every ability and returns
    /// the union of tags fired this tick.
    pub fn tick_executions(
        &mut self,
        dt_ms: i64,
        timelines: &TimelineRegistry,
        gameplay_state: &dyn GameplayState,
        collector: &mut dyn EventCollector,
    ) -> Vec<String> {
        let AbilitySet {
            abilities,
            tags,
            attributes,
            grant_order,
            ..
        } = self;
        let mut fired = Vec::new();
        for &gen_index in grant_order.iter() {
            if let Some(ability) = abilities.get_mut(gen_index) {
                fired.extend(ability.tick_executions(dt_ms, timelines, tags, attributes, gameplay_state, collector));
            }
        }
        fired
    }

    /// Post-phase delivery to every granted ability's components.
    pub fn receive_event(
        &mut self,
        event: &GameEvent,
        pipeline: &mut EventPipeline,
        collector: &mut dyn EventCollector,
        gameplay_state: &dyn GameplayState,
    ) {
        let AbilitySet {
            abilities,
            attributes,
            tags,
            grant_order,
            config,
            ..
        } = self;
        for &gen_index in grant_order.iter() {
            if let Some(ability) = abilities.get_mut(gen_index) {
                let info = ability.info();
                let mut requests = Vec::new();
                let mut ctx = ComponentCtx {
                    attributes,
                    tags,
                    pipeline,
                    collector,
                    gameplay_state,
                    ability: info,
                    activation_requests: &mut requests,
                    config: config.clone(),
                };
                ability.receive_event(event, &mut ctx);
            }
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeSpec;
    use crate::event::VecCollector;
    use std::rc::Rc;

    struct NullState;
    impl GameplayState for NullState {
        fn logic_time(&self) -> i64 {
            0
        }
        fn alive_actors(&self) -> Vec<ActorId> {
            Vec::new()
        }
        fn actor_exists(&self, _id: &ActorId) -> bool {
            true
        }
    }

    fn schema() -> Rc<AttributeSchema> {
        let mut schema = AttributeSchema::default();
        schema.register("atk", AttributeSpec::new(50.0, 0.0, 9999.0));
        Rc::new(schema)
    }

    fn set() -> AbilitySet {
        AbilitySet::new(ActorId::new("hero"), schema(), Rc::new(RuntimeConfig::new(1)))
    }

    #[test]
    fn duration_buff_expires_and_cleans_up_modifier() {
        let mut set = set();
        let mut pipeline = EventPipeline::new();
        let mut collector = VecCollector::default();
        let state = NullState;

        let config = AbilityConfig::new("atk_buff")
            .with_component(Component::TimeDuration(TimeDurationComponent::new(2000)))
            .with_component(Component::StatModifier(StatModifierComponent::new(
                "atk",
                ModifierOp::Add,
                20.0,
            )));
        let id = set.grant(config, &mut pipeline, &mut collector, &state);
        assert_eq!(set.attributes.get("atk").unwrap(), 70.0);

        set.tick(1500, 1500, &mut pipeline, &mut collector, &state);
        assert_eq!(set.attributes.get("atk").unwrap(), 70.0, "not yet expired");

        set.tick(500, 2000, &mut pipeline, &mut collector, &state);
        assert_eq!(set.attributes.get("atk").unwrap(), 50.0, "expired, modifier removed");
        assert!(set.find_by_id(&id).is_none(), "expired ability is swept from the set");
    }

    #[test]
    fn cooldown_round_trip() {
        let mut set = set();
        let mut pipeline = EventPipeline::new();
        let mut collector = VecCollector::default();
        let state = NullState;

        let config = AbilityConfig::new("fireball").with_component(Component::ActiveUse(ActiveUseComponent {
            conditions: Vec::new(),
            costs: vec![CostKind::Cooldown { duration_ms: 5000 }],
            on_use: Box::new(|ctx| {
                ctx.tags.add_loose_tag("cast_fireball", 1, ctx.collector);
            }),
        }));
        set.grant(config, &mut pipeline, &mut collector, &state);

        let use_ability = |set: &mut AbilitySet, logic_time: i64, collector: &mut VecCollector| -> Result<(), String> {
            let gen_index = {
                let ability = set.find_by_config_id("fireball")[0];
                crate::arena::GenIndex {
                    index: ability.id.index,
                    generation: ability.id.generation,
                }
            };
            // Re-borrow mutably through the set to pay costs and invoke on_use.
            let AbilitySet { abilities, attributes, tags, config, .. } = set;
            let ability = abilities.get_mut(gen_index).unwrap();
            let info = ability.info();
            let Component::ActiveUse(active_use) = ability.components.first_mut().unwrap() else {
                unreachable!()
            };
            let mut requests = Vec::new();
            let mut ctx = ComponentCtx {
                attributes,
                tags,
                pipeline: &mut EventPipeline::new(),
                collector,
                gameplay_state: &NullState,
                ability: info,
                activation_requests: &mut requests,
                config: config.clone(),
            };
            active_use.use_now("fireball", logic_time, &mut ctx)
        };

        assert!(use_ability(&mut set, 0, &mut collector).is_ok());
        assert!(set.tags.has_tag("cooldown:fireball"));

        let second = use_ability(&mut set, 1000, &mut collector);
        assert!(second.is_err());
        assert!(second.unwrap_err().contains("cooldown"));

        set.tags.tick(5001, &mut collector);
        assert!(!set.tags.has_tag("cooldown:fireball"));
        assert!(use_ability(&mut set, 5001, &mut collector).is_ok());
    }

    /// An ability with two `PreEventComponent`s registers two distinct
    /// handler ids (one per component index), so each can be unregistered
    /// independently instead of colliding on `component_index: 0`.
    #[test]
    fn pre_event_components_get_distinct_handler_ids() {
        let mut set = set();
        let mut pipeline = EventPipeline::new();
        let mut collector = VecCollector::default();
        let state = NullState;

        let config = AbilityConfig::new("double_ward")
            .with_component(Component::PreEvent(PreEventComponent::new(
                "pre_damage",
                None,
                Box::new(|_event| Ok(crate::event::Intent::Pass)),
            )))
            .with_component(Component::PreEvent(PreEventComponent::new(
                "pre_damage",
                None,
                Box::new(|_event| Ok(crate::event::Intent::Pass)),
            )));
        let id = set.grant(config, &mut pipeline, &mut collector, &state);
        assert_eq!(pipeline.handler_count(), 2);

        pipeline.unregister_pre_handler(&PreHandlerId {
            ability: id.clone(),
            component_index: 0,
        });
        assert_eq!(pipeline.handler_count(), 1, "only the first component's handler is removed");

        pipeline.unregister_pre_handler(&PreHandlerId {
            ability: id,
            component_index: 1,
        });
        assert_eq!(pipeline.handler_count(), 0);
    }

    /// §9 OQ1's opt-in flag actually reaches the spawned execution instance
    /// when an ability is activated through the normal
    /// `AbilitySet`/`ActivateInstanceComponent` path, not only through a
    /// caller that constructs an `ExecutionInstance` directly.
    #[test]
    fn activate_instance_component_threads_zero_offset_inclusive_flag() {
        let mut registry = TimelineRegistry::new();
        registry.register(
            crate::timeline::TimelineAsset::new("flash", 100).with_tag("start", 0),
        );

        let mut set = set();
        let mut pipeline = EventPipeline::new();
        let mut collector = VecCollector::default();
        let state = NullState;

        let mut activate = ActivateInstanceComponent::new(
            vec![("cast".to_string(), None)],
            TriggerMode::Any,
            "flash",
            Box::new(Vec::new),
        );
        activate.zero_offset_inclusive = true;
        let config = AbilityConfig::new("flash_cast").with_component(Component::ActivateInstance(activate));
        set.grant(config, &mut pipeline, &mut collector, &state);
        set.receive_event(&GameEvent::new("cast"), &mut pipeline, &mut collector, &state);

        let fired = set.tick_executions(1, &registry, &state, &mut collector);
        assert_eq!(fired, vec!["start".to_string()], "offset-0 tag must fire on the first tick when opted in");
    }
}
