//! Deterministic, single-threaded ability/effect/event runtime.
//!
//! A per-actor [`ability::AbilitySet`] combines a layered [`attribute::AttributeStore`],
//! a three-class [`tags::TagBag`], and a list of granted [`ability::Ability`]s built from
//! a closed component catalog plus a host-extensible tail. A shared
//! [`event::EventPipeline`] runs pre-phase interception before events are delivered
//! post-phase to every actor's components. Abilities may instantiate
//! [`timeline::TimelineAsset`] playbacks that fire tagged actions as they tick.

pub mod ability;
pub mod arena;
pub mod attribute;
pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod ids;
pub mod registry;
pub mod rng;
pub mod tags;
pub mod timeline;

pub use ability::{Ability, AbilityConfig, AbilitySet, Component};
pub use attribute::AttributeStore;
pub use config::{AttributeSchema, AttributeSpec, RuntimeConfig, TraceLevel};
pub use error::{PipelineError, RuntimeCallbackError, RuntimeError, UsageError};
pub use event::{EventCollector, EventPipeline, GameEvent};
pub use host::{GameplayState, Logger, TracingLogger};
pub use ids::{AbilityId, ActorId, ExecutionId, PreHandlerId};
pub use registry::TimelineRegistry;
pub use rng::DeterministicRng;
pub use tags::TagBag;
pub use timeline::{Action, ExecutionContext, ExecutionInstance, TimelineAsset};
