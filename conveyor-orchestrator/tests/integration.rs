//! Cross-module scenarios spec.md §8 names as testable properties: a candidate's evaluation job
//! actually completing through a real worker pool, a safety-gate rejection still letting `learn`
//! run, and a critical step's breaker trip halting the cycle before `learn`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_backtest::{Bar, BarProvider, EngineConfig, ExitSignal, FillModel, OpenPosition, Side, Signal};
use conveyor_breaker::{BreakerConfig, BreakerRegistry};
use conveyor_execution::{ExecutionOutcome, Result as ExecResult, SimulatedExecutor, VenueExecutor};
use conveyor_instrument::InstrumentIndex;
use conveyor_orchestrator::{
    nodes, state::CycleState, CandidateJobHandler, CandidateStore, CyclePersistence, InMemoryPersistence,
    NowFn, OrchestratorConfig, OrchestratorDeps, Orchestrator, RiskContext, StaticRiskContext, StrategyAdapterFactory,
};
use conveyor_queue::{InMemoryQueue, NoopEventBus, PoolConfig, PoolSupervisor, Queue};
use conveyor_risk::{SafetyGate, SafetyGateConfig, SafetyGateReport};
use conveyor_strategy::{CandidateContext, CandidateIdea, Category, Regime, RiskParameters, StrategyAdapter, Theorizer};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::{collections::HashMap, sync::Arc};

fn bar(instrument: InstrumentIndex, ts: DateTime<Utc>, price: Decimal) -> Bar {
    Bar {
        instrument,
        timestamp: ts,
        open: price,
        high: price,
        low: price,
        close: price,
        volume: Decimal::new(100, 0),
        best_bid: None,
        best_ask: None,
        bid_size: None,
        ask_size: None,
        vwap: None,
    }
}

struct FlatBarProvider;

#[async_trait]
impl BarProvider for FlatBarProvider {
    async fn get_bars(
        &self,
        instrument: InstrumentIndex,
        _timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> conveyor_backtest::Result<Vec<Bar>> {
        Ok((0..20)
            .map(|n| bar(instrument, start + chrono::Duration::minutes(n), Decimal::new(100, 0)))
            .filter(|b| b.timestamp <= end)
            .collect())
    }
}

struct OneCandidateTheorizer;

impl Theorizer for OneCandidateTheorizer {
    fn theorize(
        &self,
        context: &CandidateContext,
        instruments: &[InstrumentIndex],
        now: DateTime<Utc>,
    ) -> conveyor_strategy::Result<Vec<CandidateIdea>> {
        Ok(vec![CandidateIdea::new(
            "cand-1",
            "flat-scan",
            Category::TrendFollowing,
            instruments.to_vec(),
            "1h",
            RiskParameters {
                max_position_fraction: Decimal::new(1, 1),
                stop_loss_fraction: Decimal::new(1, 2),
                take_profit_fraction: Decimal::new(2, 2),
                max_leverage: Decimal::new(1, 0),
            },
            0.8,
            "flat market scan",
            Some(*context),
            now,
        )])
    }
}

struct EmptyTheorizer;

impl Theorizer for EmptyTheorizer {
    fn theorize(
        &self,
        _context: &CandidateContext,
        _instruments: &[InstrumentIndex],
        _now: DateTime<Utc>,
    ) -> conveyor_strategy::Result<Vec<CandidateIdea>> {
        Ok(Vec::new())
    }
}

struct NeverSignalsAdapter;

impl StrategyAdapter for NeverSignalsAdapter {
    fn generate_signals(&self, _context: &CandidateContext, _bar: &Bar) -> Vec<Signal> {
        Vec::new()
    }

    fn exit(&self, _bar: &Bar, _position: &OpenPosition) -> Option<ExitSignal> {
        None
    }
}

struct NeverSignalsFactory;

impl StrategyAdapterFactory for NeverSignalsFactory {
    fn build(&self, _candidate: &CandidateIdea) -> Arc<dyn StrategyAdapter + Send + Sync> {
        Arc::new(NeverSignalsAdapter)
    }
}

fn fixed_now() -> NowFn {
    let now = Utc::now();
    Arc::new(move || now)
}

fn base_gate(breakers: &Arc<BreakerRegistry>, max_trade_size: Decimal) -> Arc<SafetyGate> {
    Arc::new(
        SafetyGate::new(
            SafetyGateConfig {
                max_gas_price: None,
                max_trade_size,
                min_market_liquidity: Decimal::new(1_000, 0),
                max_slippage_bps: Decimal::new(50, 0),
                max_daily_rebalances: 10,
                balance_discrepancy_threshold: Decimal::new(10, 2),
            },
            Arc::clone(breakers),
            "execute",
        )
        .unwrap(),
    )
}

struct RejectingExecutor;

#[async_trait]
impl VenueExecutor for RejectingExecutor {
    async fn execute(&self, _signal: &Signal, _decision: &SafetyGateReport) -> ExecResult<ExecutionOutcome> {
        panic!("execute must not be called once the gate has rejected the candidate");
    }
}

/// A candidate's job really travels through [`InMemoryQueue`] and a running
/// [`PoolSupervisor`], and `evaluate` observes the published result.
#[tokio::test]
async fn evaluate_node_collects_a_result_from_a_running_worker_pool() {
    let instrument = InstrumentIndex::new(0);
    let candidates: CandidateStore = Arc::new(RwLock::new(HashMap::new()));
    let candidate = CandidateIdea::new(
        "cand-1",
        "flat-scan",
        Category::TrendFollowing,
        vec![instrument],
        "1h",
        RiskParameters {
            max_position_fraction: Decimal::new(1, 1),
            stop_loss_fraction: Decimal::new(1, 2),
            take_profit_fraction: Decimal::new(2, 2),
            max_leverage: Decimal::new(1, 0),
        },
        0.8,
        "flat market scan",
        None,
        Utc::now(),
    );
    candidates.write().insert(candidate.id.clone(), candidate.clone());

    let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new());
    let handler = Arc::new(CandidateJobHandler::new(
        Arc::new(FlatBarProvider),
        Arc::clone(&candidates),
        Arc::new(NeverSignalsFactory),
    ));
    let pool = PoolSupervisor::new(Arc::clone(&queue), handler, PoolConfig::default());
    pool.start().await.unwrap();

    let now = Utc::now();
    let mut state = CycleState::create_initial("cycle-1", 1, now);
    state.candidates = vec![candidate];

    let breakers = Arc::new(BreakerRegistry::new());
    let deps = OrchestratorDeps {
        breakers: Arc::clone(&breakers),
        queue: Arc::clone(&queue),
        bar_provider: Arc::new(FlatBarProvider),
        theorizer: Arc::new(OneCandidateTheorizer),
        candidates,
        executor: Arc::new(RejectingExecutor),
        gate: base_gate(&breakers, Decimal::new(10_000, 0)),
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
        instruments: vec![instrument],
        timeframe: "1h".to_string(),
        engine_config: EngineConfig::new(Decimal::new(10_000, 0), FillModel::Standard, Decimal::new(5, 4), Decimal::new(5, 0), 0, None),
        evaluation_window_days: 1,
        now: fixed_now(),
    };

    let partial = nodes::evaluate(&deps, &state, now).await.expect("evaluate should not error");
    let results = partial.evaluation_results.expect("evaluate always sets evaluation_results when work was submitted");
    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());

    pool.stop().await.unwrap();
}

/// A CRITICAL safety-gate failure (trade size over the configured max) stops `execute` from
/// running, but `learn` still records the cycle (spec.md §7 "Safety-gate fail ... surface,
/// tolerate cycle").
#[tokio::test]
async fn safety_gate_rejection_skips_execute_but_learn_still_persists() {
    let instrument = InstrumentIndex::new(0);
    let breakers = Arc::new(BreakerRegistry::new());
    let persistence = Arc::new(InMemoryPersistence::default());
    let now = Utc::now();

    let candidate = CandidateIdea::new(
        "cand-1",
        "flat-scan",
        Category::TrendFollowing,
        vec![instrument],
        "1h",
        RiskParameters {
            max_position_fraction: Decimal::new(1, 1),
            stop_loss_fraction: Decimal::new(1, 2),
            take_profit_fraction: Decimal::new(2, 2),
            max_leverage: Decimal::new(1, 0),
        },
        0.8,
        "flat market scan",
        Some(CandidateContext { regime: Regime::Ranging, volatility: 0.0, trend_strength: 0.0 }),
        now,
    );

    let signal = Signal {
        id: "cycle-1-cand-1".to_string(),
        instrument,
        side: Side::Long,
        size_fraction: Decimal::new(1, 1),
        stop_loss_fraction: Some(Decimal::new(1, 2)),
        take_profit_fraction: Some(Decimal::new(2, 2)),
        reason: "test".to_string(),
    };

    let mut state = CycleState::create_initial("cycle-1", 1, now);
    state.selected = Some(candidate);
    state.signal = Some(signal);

    let deps = OrchestratorDeps {
        breakers: Arc::clone(&breakers),
        queue: Arc::new(InMemoryQueue::new()),
        bar_provider: Arc::new(FlatBarProvider),
        theorizer: Arc::new(OneCandidateTheorizer),
        candidates: Arc::new(RwLock::new(HashMap::new())),
        executor: Arc::new(RejectingExecutor),
        // max_trade_size below the signal's size_fraction forces a CRITICAL failure.
        gate: base_gate(&breakers, Decimal::new(1, 2)),
        risk_context: Arc::new(StaticRiskContext(RiskContext {
            venue_gas_price: None,
            market_liquidity: Decimal::new(5_000, 0),
            estimated_slippage_bps: Decimal::new(1, 0),
            detected_anomalies: Vec::new(),
            reported_balance: Decimal::new(1_000, 0),
            reconstructed_balance: Decimal::new(1_000, 0),
        })),
        persistence: Arc::clone(&persistence) as Arc<dyn CyclePersistence>,
        event_bus: Arc::new(NoopEventBus),
        instruments: vec![instrument],
        timeframe: "1h".to_string(),
        engine_config: EngineConfig::new(Decimal::new(10_000, 0), FillModel::Standard, Decimal::new(5, 4), Decimal::new(5, 0), 0, None),
        evaluation_window_days: 1,
        now: fixed_now(),
    };

    let gate_partial = nodes::risk_gate(&deps, &state, now).await.unwrap();
    let state = conveyor_orchestrator::apply(&state, gate_partial);
    assert!(!state.risk_assessment.as_ref().unwrap().passed);

    let execute_partial = nodes::execute(&deps, &state, now).await.unwrap();
    let state = conveyor_orchestrator::apply(&state, execute_partial);
    assert!(state.execution_outcome.is_none());

    let learn_partial = nodes::learn(&deps, &state, now).await.unwrap();
    let state = conveyor_orchestrator::apply(&state, learn_partial);
    assert_eq!(state.status, conveyor_orchestrator::CycleStatus::SkippedSafetyGate);

    let snapshot = persistence.strategy("cand-1").expect("learn must upsert the selected candidate's snapshot");
    assert!(!snapshot.active);

    // the execute breaker was opened by the CRITICAL gate failure, not by execute itself.
    assert!(breakers.get_status("execute").unwrap().is_open);
}

/// A pre-tripped `execute` breaker halts the whole cycle at that step: `learn` never runs, so no
/// persistence write happens (spec.md §4.3 "a breaker trip means the cycle skips execute and
/// ends with SKIPPED_* status").
#[tokio::test]
async fn execute_breaker_trip_halts_before_learn_persists_anything() {
    let instrument = InstrumentIndex::new(0);
    let breakers = Arc::new(BreakerRegistry::new());
    breakers.open_breaker("execute", BreakerConfig::execute());
    let persistence = Arc::new(InMemoryPersistence::default());

    let deps = OrchestratorDeps {
        breakers: Arc::clone(&breakers),
        queue: Arc::new(InMemoryQueue::new()),
        bar_provider: Arc::new(FlatBarProvider),
        // no candidates means `select` never staffs a signal; this test only pins the halt at
        // `execute` itself, not the pipeline's earlier behaviour, and skips evaluate's poll loop.
        theorizer: Arc::new(EmptyTheorizer),
        candidates: Arc::new(RwLock::new(HashMap::new())),
        executor: Arc::new(RejectingExecutor),
        gate: base_gate(&breakers, Decimal::new(10_000, 0)),
        risk_context: Arc::new(StaticRiskContext(RiskContext {
            venue_gas_price: None,
            market_liquidity: Decimal::new(5_000, 0),
            estimated_slippage_bps: Decimal::new(1, 0),
            detected_anomalies: Vec::new(),
            reported_balance: Decimal::new(1_000, 0),
            reconstructed_balance: Decimal::new(1_000, 0),
        })),
        persistence: Arc::clone(&persistence) as Arc<dyn CyclePersistence>,
        event_bus: Arc::new(NoopEventBus),
        instruments: vec![instrument],
        timeframe: "1h".to_string(),
        engine_config: EngineConfig::new(Decimal::new(10_000, 0), FillModel::Standard, Decimal::new(5, 4), Decimal::new(5, 0), 0, None),
        evaluation_window_days: 1,
        now: fixed_now(),
    };

    let orchestrator = Orchestrator::new(OrchestratorConfig::default(), deps);
    let state = orchestrator.invoke("cycle-1", 1).await;

    assert_eq!(state.current_step, "execute");
    assert!(persistence.strategy("cand-1").is_none());
    assert!(persistence.backtest_result("cycle-1-cand-1").is_none());
}
