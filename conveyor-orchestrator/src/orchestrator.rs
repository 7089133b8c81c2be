//! Drives one cycle through the fixed node sequence, each wrapped in its own named circuit
//! breaker (spec.md §4.3 "Orchestrator contract").

use crate::{
    config::OrchestratorConfig,
    deps::OrchestratorDeps,
    error::{OrchestratorError, Result},
    nodes,
    state::{apply, CycleState, CycleStatus, CyclePartial},
};
use chrono::{DateTime, Utc};
use conveyor_breaker::BreakerConfig;
use conveyor_queue::{publish_lifecycle, LifecycleEvent};
use futures::FutureExt;
use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

/// Drives cycles. One instance owns one execute-breaker namespace (spec.md §5 "multiple
/// orchestrator instances may run concurrently only if they do not share an execute breaker
/// namespace").
pub struct Orchestrator {
    config: OrchestratorConfig,
    deps: OrchestratorDeps,
    consecutive_errors: AtomicU32,
    emergency_halt: AtomicBool,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, deps: OrchestratorDeps) -> Self {
        let emergency_halt = AtomicBool::new(config.emergency_halt_on_start);
        Self { config, deps, consecutive_errors: AtomicU32::new(0), emergency_halt }
    }

    /// Set from outside (an admin signal, a risk incident) to force every subsequent cycle to
    /// halt immediately until cleared.
    pub fn trigger_emergency_halt(&self) {
        self.emergency_halt.store(true, Ordering::SeqCst);
        publish_lifecycle(self.deps.event_bus.as_ref(), LifecycleEvent::Paused, None, Utc::now());
    }

    pub fn clear_emergency_halt(&self) {
        self.emergency_halt.store(false, Ordering::SeqCst);
        publish_lifecycle(self.deps.event_bus.as_ref(), LifecycleEvent::Resumed, None, Utc::now());
    }

    pub fn is_emergency_halted(&self) -> bool {
        self.emergency_halt.load(Ordering::SeqCst)
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    /// Runs one full cycle: `context -> theorize -> evaluate -> select -> risk-gate -> execute ->
    /// learn`, unconditionally in sequence unless a critical step's breaker trips (spec.md §7
    /// error taxonomy: a data-absent `*_EMPTY` skip tolerates and the pipeline continues; a
    /// breaker-open on a critical step surfaces and ends the cycle).
    pub async fn invoke(&self, cycle_id: impl Into<String>, cycle_number: u64) -> CycleState {
        let now = (self.deps.now)();
        let state = CycleState::create_initial(cycle_id, cycle_number, now);

        if self.is_emergency_halted() {
            let partial = CyclePartial::default()
                .with_status(CycleStatus::EmergencyHalt)
                .add_error(&state, "emergency halt is set; cycle skipped entirely", now);
            return apply(&state, partial);
        }

        let state = match self.run_step(&state, "context", BreakerConfig::rpc(), false, now, |deps, state, now| {
            nodes::context(deps, state, now)
        })
        .await
        {
            Ok(state) => state,
            Err(halted) => return self.finish(halted),
        };

        let state = match self.run_step(&state, "theorize", BreakerConfig::rpc(), false, now, |deps, state, now| {
            nodes::theorize(deps, state, now)
        })
        .await
        {
            Ok(state) => state,
            Err(halted) => return self.finish(halted),
        };

        let state = match self.run_step(&state, "evaluate", BreakerConfig::evaluation_fetch(), false, now, |deps, state, now| {
            nodes::evaluate(deps, state, now)
        })
        .await
        {
            Ok(state) => state,
            Err(halted) => return self.finish(halted),
        };

        let state = match self.run_step(&state, "select", BreakerConfig::rpc(), false, now, |deps, state, now| {
            nodes::select(deps, state, now)
        })
        .await
        {
            Ok(state) => state,
            Err(halted) => return self.finish(halted),
        };

        let state = match self.run_step(&state, "risk-gate", BreakerConfig::rpc(), true, now, |deps, state, now| {
            nodes::risk_gate(deps, state, now)
        })
        .await
        {
            Ok(state) => state,
            Err(halted) => return self.finish(halted),
        };

        let state = match self.run_step(&state, "execute", BreakerConfig::execute(), true, now, |deps, state, now| {
            nodes::execute(deps, state, now)
        })
        .await
        {
            Ok(state) => state,
            Err(halted) => return self.finish(halted),
        };

        let state = match self.run_step(&state, "learn", BreakerConfig::rpc(), false, now, |deps, state, now| {
            nodes::learn(deps, state, now)
        })
        .await
        {
            Ok(state) => state,
            Err(halted) => return self.finish(halted),
        };

        self.finish(state)
    }

    /// Runs one node under its named breaker, catching both a returned `Err` and a panic as the
    /// same failure. Non-critical steps always supply a fallback, so [`conveyor_breaker`] never
    /// returns an error for them; critical steps supply none, so any failure (breaker already
    /// open, or this op's own failure tripping it) surfaces as `Err` and the cycle halts here.
    async fn run_step<'a, F, Fut>(
        &'a self,
        state: &'a CycleState,
        name: &'static str,
        config: BreakerConfig,
        critical: bool,
        now: DateTime<Utc>,
        node: F,
    ) -> std::result::Result<CycleState, CycleState>
    where
        F: FnOnce(&'a OrchestratorDeps, &'a CycleState, DateTime<Utc>) -> Fut,
        Fut: Future<Output = Result<CyclePartial>> + 'a,
    {
        let op = move || Self::guarded(node(&self.deps, state, now));

        if critical {
            match self.deps.breakers.execute_async(name, config, op, None::<fn() -> CyclePartial>).await {
                Ok(partial) => Ok(apply(state, partial.with_step(name))),
                Err(error) => {
                    let partial = CyclePartial::default()
                        .with_step(name)
                        .with_status(CycleStatus::SkippedCircuitBreaker(name.to_string()))
                        .add_error(state, format!("{name}: {error}"), now);
                    Err(apply(state, partial))
                }
            }
        } else {
            let fallback_name = name.to_string();
            let partial = self
                .deps
                .breakers
                .execute_async(
                    name,
                    config,
                    op,
                    Some(move || {
                        CyclePartial::default().with_status(CycleStatus::SkippedCircuitBreaker(fallback_name.clone()))
                    }),
                )
                .await
                .unwrap_or_else(|_| CyclePartial::default());
            Ok(apply(state, partial.with_step(name)))
        }
    }

    /// Converts a node panic into the same `Err` shape a returned failure takes (spec.md §7
    /// `[ADD]`).
    async fn guarded(fut: impl Future<Output = Result<CyclePartial>>) -> Result<CyclePartial> {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::NodePanic),
        }
    }

    /// Updates the consecutive-error counter and trips the execute breaker manually at the
    /// configured threshold (spec.md §4.3 "Consecutive-error tripping").
    fn finish(&self, state: CycleState) -> CycleState {
        let executed = state.execution_outcome.as_ref().map(|o| o.accepted).unwrap_or(false);
        if executed {
            self.consecutive_errors.store(0, Ordering::SeqCst);
        } else if is_cycle_error(&state) {
            let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
            if errors >= self.config.max_consecutive_errors {
                self.deps.breakers.open_breaker("execute", BreakerConfig::execute());
                publish_lifecycle(self.deps.event_bus.as_ref(), LifecycleEvent::BreakerOpen, Some("execute"), Utc::now());
            }
        }
        state
    }
}

fn is_cycle_error(state: &CycleState) -> bool {
    matches!(
        state.status,
        CycleStatus::Failed(_) | CycleStatus::SkippedCircuitBreaker(_) | CycleStatus::EmergencyHalt
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        persistence::InMemoryPersistence,
        risk_context::{RiskContext, StaticRiskContext},
        strategy_bridge::CandidateStore,
    };
    use async_trait::async_trait;
    use conveyor_backtest::{Bar, BarProvider, EngineConfig, FillModel};
    use conveyor_breaker::BreakerRegistry;
    use conveyor_execution::{ExecutionOutcome, VenueExecutor};
    use conveyor_instrument::InstrumentIndex;
    use conveyor_queue::{InMemoryQueue, NoopEventBus};
    use conveyor_risk::{SafetyGate, SafetyGateConfig, SafetyGateReport};
    use conveyor_strategy::{CandidateIdea, Theorizer};
    use parking_lot::RwLock;
    use rust_decimal::Decimal;
    use std::{collections::HashMap, sync::Arc};

    struct EmptyBarProvider;

    #[async_trait]
    impl BarProvider for EmptyBarProvider {
        async fn get_bars(
            &self,
            _instrument: InstrumentIndex,
            _timeframe: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> conveyor_backtest::Result<Vec<Bar>> {
            Ok(Vec::new())
        }
    }

    struct NoIdeasTheorizer;

    impl Theorizer for NoIdeasTheorizer {
        fn theorize(
            &self,
            _context: &conveyor_strategy::CandidateContext,
            _instruments: &[InstrumentIndex],
            _now: DateTime<Utc>,
        ) -> conveyor_strategy::Result<Vec<CandidateIdea>> {
            Ok(Vec::new())
        }
    }

    struct NeverCalledExecutor;

    #[async_trait]
    impl VenueExecutor for NeverCalledExecutor {
        async fn execute(
            &self,
            _signal: &conveyor_backtest::Signal,
            _decision: &SafetyGateReport,
        ) -> conveyor_execution::Result<ExecutionOutcome> {
            panic!("execute should not be called when there is nothing to execute");
        }
    }

    fn test_deps() -> OrchestratorDeps {
        let breakers = Arc::new(BreakerRegistry::new());
        let gate = Arc::new(
            SafetyGate::new(SafetyGateConfig {
                max_gas_price: None,
                max_trade_size: Decimal::new(10_000, 0),
                min_market_liquidity: Decimal::new(1_000, 0),
                max_slippage_bps: Decimal::new(50, 0),
                max_daily_rebalances: 10,
                balance_discrepancy_threshold: Decimal::new(10, 2),
            }, Arc::clone(&breakers), "execute")
            .unwrap(),
        );
        OrchestratorDeps {
            breakers,
            queue: Arc::new(InMemoryQueue::default()),
            bar_provider: Arc::new(EmptyBarProvider),
            theorizer: Arc::new(NoIdeasTheorizer),
            candidates: Arc::new(RwLock::new(HashMap::new())) as CandidateStore,
            executor: Arc::new(NeverCalledExecutor),
            gate,
            risk_context: Arc::new(StaticRiskContext(RiskContext {
                venue_gas_price: None,
                market_liquidity: Decimal::new(5_000, 0),
                estimated_slippage_bps: Decimal::new(1, 0),
                detected_anomalies: Vec::new(),
                reported_balance: Decimal::new(1_000, 0),
                reconstructed_balance: Decimal::new(1_000, 0),
            })),
            persistence: Arc::new(InMemoryPersistence::default()),
            event_bus: Arc::new(NoopEventBus),
            instruments: vec![InstrumentIndex::new(0)],
            timeframe: "1h".to_string(),
            engine_config: EngineConfig::new(Decimal::new(10_000, 0), FillModel::Standard, Decimal::new(5, 4), Decimal::new(5, 0), 0, None),
            evaluation_window_days: 30,
            now: Arc::new(Utc::now),
        }
    }

    #[tokio::test]
    async fn no_bars_runs_all_steps_and_ends_skipped_empty() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default(), test_deps());
        let state = orchestrator.invoke("cycle-1", 1).await;

        assert!(matches!(state.status, CycleStatus::SkippedEmpty(_)));
        assert!(state.candidates.is_empty());
        assert!(state.selected.is_none());
        assert!(state.execution_outcome.is_none());
    }

    #[tokio::test]
    async fn emergency_halt_on_start_skips_every_node() {
        let mut config = OrchestratorConfig::default();
        config.emergency_halt_on_start = true;
        let orchestrator = Orchestrator::new(config, test_deps());
        let state = orchestrator.invoke("cycle-1", 1).await;

        assert_eq!(state.status, CycleStatus::EmergencyHalt);
        assert_eq!(state.current_step, "context");
    }

    #[tokio::test]
    async fn execute_breaker_open_halts_the_cycle_before_learn() {
        let deps = test_deps();
        deps.breakers.open_breaker("execute", BreakerConfig::execute());
        let orchestrator = Orchestrator::new(OrchestratorConfig::default(), deps);
        let state = orchestrator.invoke("cycle-1", 1).await;

        // `execute` is critical with no fallback: a pre-opened breaker halts the cycle at that
        // step and `learn` never runs (spec.md §4.3 "a breaker trip means the cycle skips
        // execute and ends with SKIPPED_* status").
        assert_eq!(state.current_step, "execute");
        assert_eq!(state.status, CycleStatus::SkippedCircuitBreaker("execute".to_string()));
    }

    #[tokio::test]
    async fn consecutive_failed_cycles_trip_the_execute_breaker() {
        let mut deps = test_deps();
        let bus = Arc::new(conveyor_queue::RecordingEventBus::default());
        deps.event_bus = bus.clone();
        let breakers = Arc::clone(&deps.breakers);
        let mut config = OrchestratorConfig::default();
        config.max_consecutive_errors = 2;
        let orchestrator = Orchestrator::new(config, deps);

        breakers.open_breaker("risk-gate", BreakerConfig::rpc());
        for n in 1..=2u64 {
            orchestrator.invoke(format!("cycle-{n}"), n).await;
        }

        assert!(breakers.get_status("execute").unwrap().is_open);
        assert!(bus.published.lock().iter().any(|(topic, _)| topic == "system:lifecycle"));
    }
}
