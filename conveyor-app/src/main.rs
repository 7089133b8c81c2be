//! Process entry point (spec.md §6 "Process surface"): wires one [`Orchestrator`] and one
//! [`PoolSupervisor`] to a fixed-interval cycle loop, honoring `SIGTERM`/`SIGINT` for graceful
//! shutdown and `SIGUSR1` for an on-demand stats dump. Exit codes: `0` normal, `1` fatal init
//! failure, `2` emergency halt triggered — mirrors the `from_env()` + `process::exit(1)` +
//! signal-aware `tokio::select!` loop every agent binary in this pack's example set uses.

mod config;
mod defaults;

use conveyor_breaker::BreakerRegistry;
use conveyor_execution::SimulatedExecutor;
use conveyor_orchestrator::{
    CandidateJobHandler, CandidateStore, InMemoryPersistence, Orchestrator, OrchestratorDeps, RiskContext, StaticRiskContext,
};
use conveyor_queue::{InMemoryQueue, NoopEventBus, PoolSupervisor, Queue, RedisQueue};
use conveyor_risk::SafetyGate;
use config::{AppConfig, QueueBackend};
use conveyor_strategy::Theorizer;
use defaults::{FixedCandidateTheorizer, NullBarProvider, NullStrategyAdapterFactory, NullTheorizer};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

const EXIT_OK: i32 = 0;
const EXIT_INIT_FAILURE: i32 = 1;
const EXIT_EMERGENCY_HALT: i32 = 2;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "fatal: invalid configuration");
            std::process::exit(EXIT_INIT_FAILURE);
        }
    };

    let exit_code = run(config).await.unwrap_or_else(|error| {
        tracing::error!(%error, "fatal: startup failed");
        EXIT_INIT_FAILURE
    });

    std::process::exit(exit_code);
}

async fn run(config: AppConfig) -> Result<i32, Box<dyn std::error::Error>> {
    config.orchestrator.validate()?;

    let queue: Arc<dyn Queue> = match &config.queue_backend {
        QueueBackend::InMemory => Arc::new(InMemoryQueue::new()),
        QueueBackend::Redis { url, queue_name } => Arc::new(RedisQueue::connect(url, queue_name).await?),
    };

    let breakers = Arc::new(BreakerRegistry::new());
    let event_bus = Arc::new(NoopEventBus);
    let candidates: CandidateStore = CandidateStore::default();

    let gate = Arc::new(SafetyGate::new(config.orchestrator.gate, breakers.clone(), config.execute_breaker_name.clone())?);

    let bar_provider = Arc::new(NullBarProvider);
    let theorizer: Arc<dyn Theorizer> = if config.demo_theorizer {
        Arc::new(FixedCandidateTheorizer::default())
    } else {
        Arc::new(NullTheorizer)
    };
    let strategy_factory = Arc::new(NullStrategyAdapterFactory);

    let job_handler = Arc::new(CandidateJobHandler::new(bar_provider.clone(), candidates.clone(), strategy_factory));
    let pool = Arc::new(PoolSupervisor::new(queue.clone(), job_handler, config.pool));

    if config.instruments.is_empty() {
        return Err("CONVEYOR_INSTRUMENTS must name at least one instrument".into());
    }
    let executor = Arc::new(SimulatedExecutor::new(config.simulated_fill_price, config.simulated_commission_rate));

    let risk_context = Arc::new(StaticRiskContext(RiskContext {
        venue_gas_price: None,
        market_liquidity: config.orchestrator.gate.min_market_liquidity * rust_decimal::Decimal::new(10, 0),
        estimated_slippage_bps: rust_decimal::Decimal::ZERO,
        detected_anomalies: Vec::new(),
        reported_balance: config.engine_config.initial_capital,
        reconstructed_balance: config.engine_config.initial_capital,
    }));
    let persistence = Arc::new(InMemoryPersistence::new());

    let deps = OrchestratorDeps {
        breakers,
        queue: queue.clone(),
        bar_provider,
        theorizer,
        candidates,
        executor,
        gate,
        risk_context,
        persistence,
        event_bus,
        instruments: config.instruments.clone(),
        timeframe: config.timeframe.clone(),
        engine_config: config.engine_config,
        evaluation_window_days: config.evaluation_window_days,
        now: conveyor_orchestrator::default_now(),
    };

    let orchestrator = Arc::new(Orchestrator::new(config.orchestrator, deps));

    pool.start().await?;
    tracing::info!(worker_count = config.pool.worker_count, "worker pool started");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(config.cycle_interval_ms));

    let mut cycle_number = 0u64;
    let exit_code = loop {
        tokio::select! {
            _ = interval.tick() => {
                cycle_number += 1;
                let state = orchestrator.invoke(format!("cycle-{cycle_number}"), cycle_number).await;
                tracing::info!(cycle = cycle_number, status = ?state.status, "cycle complete");
                if matches!(state.status, conveyor_orchestrator::CycleStatus::EmergencyHalt) {
                    break EXIT_EMERGENCY_HALT;
                }
            }
            _ = sigusr1.recv() => {
                match pool.stats().await {
                    Ok(stats) => tracing::info!(?stats, "stats dump (SIGUSR1)"),
                    Err(error) => tracing::warn!(%error, "failed to read pool stats"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
                break EXIT_OK;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break EXIT_OK;
            }
        }
    };

    pool.stop().await?;
    queue.close().await?;
    tracing::info!("shutdown complete");
    Ok(exit_code)
}
