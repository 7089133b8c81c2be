//! Everything a cycle needs reaching outside its own state: the breaker registry, the queue, the
//! external boundary traits (§6), and the clock. Bundled so [`crate::orchestrator::Orchestrator`]
//! takes one constructor argument instead of eight.

use crate::{risk_context::RiskContextProvider, strategy_bridge::CandidateStore};
use chrono::{DateTime, Utc};
use conveyor_backtest::{BarProvider, EngineConfig};
use conveyor_breaker::BreakerRegistry;
use conveyor_execution::VenueExecutor;
use conveyor_instrument::InstrumentIndex;
use conveyor_queue::{EventBus, Queue};
use conveyor_risk::SafetyGate;
use conveyor_strategy::Theorizer;
use std::sync::Arc;

use crate::persistence::CyclePersistence;

/// Clock seam: defaults to [`Utc::now`], overridden in tests for deterministic timestamps.
/// Distinct from [`conveyor_clock`]'s virtual clock, which times the backtest engine's replay,
/// not the live cycle loop.
pub type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn default_now() -> NowFn {
    Arc::new(Utc::now)
}

/// The instruments a cycle scans for context and theorizes candidates over. Fixed per
/// deployment; the core has no opinion on how an instrument universe is chosen (spec.md §1
/// Non-goals).
pub struct OrchestratorDeps {
    pub breakers: Arc<BreakerRegistry>,
    pub queue: Arc<dyn Queue>,
    pub bar_provider: Arc<dyn BarProvider>,
    pub theorizer: Arc<dyn Theorizer>,
    pub candidates: CandidateStore,
    pub executor: Arc<dyn VenueExecutor>,
    pub gate: Arc<SafetyGate>,
    pub risk_context: Arc<dyn RiskContextProvider>,
    pub persistence: Arc<dyn CyclePersistence>,
    pub event_bus: Arc<dyn EventBus>,
    pub instruments: Vec<InstrumentIndex>,
    pub timeframe: String,
    /// Used by `evaluate` to build each candidate's [`conveyor_queue::EvaluationJob`] (spec.md
    /// §6 "engine: `initialCapital`, `fillModel`, `commissionRate`, `slippageBps`, `latencyMs`,
    /// `randomSeed?`").
    pub engine_config: EngineConfig,
    pub evaluation_window_days: u32,
    pub now: NowFn,
}
