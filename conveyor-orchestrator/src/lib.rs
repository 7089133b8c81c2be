//! Pipeline Orchestrator with Safety Gate (spec.md §2 "≈40% of core"). Drives a fixed sequence
//! of nodes over an immutable-per-step [`state::CycleState`], each wrapped in a named circuit
//! breaker, with typed fallbacks for non-critical steps and emergency-halt/consecutive-error
//! tripping layered on top.
//!
//! Event bus and lifecycle event types are not redefined here: [`conveyor_queue::EventBus`] and
//! [`conveyor_queue::LifecycleEvent`] already shape exactly what spec.md §6 "Event bus publish"
//! and "Lifecycle events" describe. `evaluate` publishes each collected result on the same bus
//! (`evaluation:complete`/`evaluation:failed`), and the orchestrator publishes `BreakerOpen` when
//! it trips the execute breaker itself.

pub mod config;
pub mod deps;
pub mod error;
pub mod nodes;
pub mod orchestrator;
pub mod persistence;
pub mod risk_context;
pub mod state;
pub mod strategy_bridge;

pub use config::OrchestratorConfig;
pub use deps::{default_now, NowFn, OrchestratorDeps};
pub use error::{OrchestratorError, Result};
pub use orchestrator::Orchestrator;
pub use persistence::{CyclePersistence, InMemoryPersistence, StrategySnapshot};
pub use risk_context::{RiskContext, RiskContextProvider, StaticRiskContext};
pub use state::{apply, CycleState, CyclePartial, CycleStatus};
pub use strategy_bridge::{CandidateJobHandler, CandidateStore, StrategyAdapterFactory};
