//! Environment-driven configuration. The core has no config-file format opinion (spec.md §1
//! Non-goals "no CLI/config-file format is specified by the core"); this binary reads everything
//! through `std::env`, the same convention the teacher's own deployment scripts and every
//! example agent binary in this pack use, with an optional `.env` file loaded first via
//! `dotenvy` for local development.

use conveyor_backtest::{EngineConfig, FillModel};
use conveyor_instrument::InstrumentIndex;
use conveyor_orchestrator::OrchestratorConfig;
use conveyor_queue::PoolConfig;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

fn env_or(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn parse_decimal(name: &'static str, default: Decimal) -> Result<Decimal, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => Decimal::from_str(&value).map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn parse_fill_model(value: &str) -> Option<FillModel> {
    match value {
        "standard" => Some(FillModel::Standard),
        "pessimistic" => Some(FillModel::Pessimistic),
        "optimistic" => Some(FillModel::Optimistic),
        _ => None,
    }
}

/// Where the worker pool claims and completes [`conveyor_queue::EvaluationJob`]s. `CONVEYOR_REDIS_URL`
/// selects the durable transport (spec.md §4.2 `[ADD]` "Transport"); otherwise the process owns an
/// in-memory queue private to itself.
#[derive(Debug, Clone)]
pub enum QueueBackend {
    InMemory,
    Redis { url: String, queue_name: String },
}

/// Everything [`crate::main`] needs to build one [`conveyor_orchestrator::Orchestrator`] and
/// [`conveyor_queue::PoolSupervisor`] pair.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub instruments: Vec<InstrumentIndex>,
    pub timeframe: String,
    pub evaluation_window_days: u32,
    pub engine_config: EngineConfig,
    pub queue_backend: QueueBackend,
    pub pool: PoolConfig,
    pub orchestrator: OrchestratorConfig,
    pub execute_breaker_name: String,
    pub simulated_fill_price: Decimal,
    pub simulated_commission_rate: Decimal,
    pub cycle_interval_ms: u64,
    /// `CONVEYOR_DEMO_THEORIZER=1` swaps the safe no-candidate default for
    /// [`crate::defaults::FixedCandidateTheorizer`], so a fresh deployment can exercise the
    /// full pipeline (`evaluate`/`risk-gate`/`execute`) before a real strategy catalog exists.
    pub demo_theorizer: bool,
}

impl AppConfig {
    /// Reads every setting from the process environment, falling back to defaults tuned for a
    /// single-instrument paper-trading deployment where a variable is unset. Fails closed:
    /// an unparsable value is a fatal init error (spec.md §6 "Exit codes: `1` fatal init
    /// failure"), never a silently-ignored default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let instruments = env_or("CONVEYOR_INSTRUMENTS", "0")
            .split(',')
            .map(|s| s.trim().parse::<usize>().map(InstrumentIndex::new))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ConfigError::Invalid { name: "CONVEYOR_INSTRUMENTS", value: env_or("CONVEYOR_INSTRUMENTS", "0") })?;

        let timeframe = env_or("CONVEYOR_TIMEFRAME", "1h");
        let evaluation_window_days = parse_env("CONVEYOR_EVALUATION_WINDOW_DAYS", 30u32)?;

        let fill_model_raw = env_or("CONVEYOR_FILL_MODEL", "standard");
        let fill_model = parse_fill_model(&fill_model_raw)
            .ok_or_else(|| ConfigError::Invalid { name: "CONVEYOR_FILL_MODEL", value: fill_model_raw })?;

        let engine_config = EngineConfig::new(
            parse_decimal("CONVEYOR_INITIAL_CAPITAL", Decimal::new(10_000, 0))?,
            fill_model,
            parse_decimal("CONVEYOR_COMMISSION_RATE", Decimal::new(5, 4))?,
            parse_decimal("CONVEYOR_SLIPPAGE_BPS", Decimal::new(5, 0))?,
            parse_env("CONVEYOR_LATENCY_MS", 0u64)?,
            env::var("CONVEYOR_RANDOM_SEED").ok().and_then(|v| v.parse().ok()),
        );

        let queue_backend = match env::var("CONVEYOR_REDIS_URL") {
            Ok(url) => QueueBackend::Redis { url, queue_name: env_or("CONVEYOR_QUEUE_NAME", "evaluation") },
            Err(_) => QueueBackend::InMemory,
        };

        let mut pool = PoolConfig::default();
        pool.worker_count = parse_env("CONVEYOR_WORKER_COUNT", pool.worker_count)?;
        pool.worker.concurrency = parse_env("CONVEYOR_WORKER_CONCURRENCY", pool.worker.concurrency)?;

        let mut orchestrator = OrchestratorConfig::default();
        orchestrator.max_consecutive_errors = parse_env("CONVEYOR_MAX_CONSECUTIVE_ERRORS", orchestrator.max_consecutive_errors)?;
        orchestrator.emergency_halt_on_start = parse_env("CONVEYOR_EMERGENCY_HALT_ON_START", orchestrator.emergency_halt_on_start)?;
        orchestrator.gate.max_trade_size = parse_decimal("CONVEYOR_MAX_TRADE_SIZE", orchestrator.gate.max_trade_size)?;
        orchestrator.gate.min_market_liquidity = parse_decimal("CONVEYOR_MIN_MARKET_LIQUIDITY", orchestrator.gate.min_market_liquidity)?;
        orchestrator.gate.max_slippage_bps = parse_decimal("CONVEYOR_MAX_SLIPPAGE_BPS", orchestrator.gate.max_slippage_bps)?;
        orchestrator.gate.max_daily_rebalances = parse_env("CONVEYOR_MAX_DAILY_REBALANCES", orchestrator.gate.max_daily_rebalances)?;
        orchestrator.gate.balance_discrepancy_threshold =
            parse_decimal("CONVEYOR_BALANCE_DISCREPANCY_THRESHOLD", orchestrator.gate.balance_discrepancy_threshold)?;
        if let Ok(value) = env::var("CONVEYOR_MAX_GAS_PRICE") {
            orchestrator.gate.max_gas_price =
                Some(Decimal::from_str(&value).map_err(|_| ConfigError::Invalid { name: "CONVEYOR_MAX_GAS_PRICE", value })?);
        }
        let cycle_interval_ms = parse_env("CONVEYOR_CYCLE_INTERVAL_MS", orchestrator.cycle_interval_ms)?;
        orchestrator.cycle_interval_ms = cycle_interval_ms;

        Ok(Self {
            instruments,
            timeframe,
            evaluation_window_days,
            engine_config,
            queue_backend,
            pool,
            orchestrator,
            execute_breaker_name: env_or("CONVEYOR_EXECUTE_BREAKER_NAME", "execute"),
            simulated_fill_price: parse_decimal("CONVEYOR_SIMULATED_FILL_PRICE", Decimal::new(100, 0))?,
            simulated_commission_rate: parse_decimal("CONVEYOR_SIMULATED_COMMISSION_RATE", Decimal::new(1, 3))?,
            cycle_interval_ms,
            demo_theorizer: parse_env("CONVEYOR_DEMO_THEORIZER", false)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_with_no_environment_set() {
        for (key, _) in env::vars() {
            if key.starts_with("CONVEYOR_") {
                env::remove_var(key);
            }
        }
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.instruments, vec![InstrumentIndex::new(0)]);
        assert_eq!(config.timeframe, "1h");
        assert!(matches!(config.queue_backend, QueueBackend::InMemory));
    }

    #[test]
    fn redis_url_selects_redis_backend() {
        for (key, _) in env::vars() {
            if key.starts_with("CONVEYOR_") {
                env::remove_var(key);
            }
        }
        env::set_var("CONVEYOR_REDIS_URL", "redis://localhost:6379");
        let config = AppConfig::from_env().unwrap();
        assert!(matches!(config.queue_backend, QueueBackend::Redis { .. }));
        env::remove_var("CONVEYOR_REDIS_URL");
    }

    #[test]
    fn invalid_fill_model_is_rejected() {
        for (key, _) in env::vars() {
            if key.starts_with("CONVEYOR_") {
                env::remove_var(key);
            }
        }
        env::set_var("CONVEYOR_FILL_MODEL", "nonsense");
        assert!(AppConfig::from_env().is_err());
        env::remove_var("CONVEYOR_FILL_MODEL");
    }
}
