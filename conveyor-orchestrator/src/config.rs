use crate::error::{OrchestratorError, Result};
use conveyor_risk::SafetyGateConfig;
use serde::{Deserialize, Serialize};

/// Orchestrator-level configuration (spec.md §6 "orchestrator: `maxConsecutiveErrors`,
/// `cycleIntervalMs`, `emergencyHaltOnStart`").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Consecutive failed cycles at which the execute breaker is opened explicitly (spec.md §4.3
    /// "Consecutive-error tripping").
    pub max_consecutive_errors: u32,
    pub cycle_interval_ms: u64,
    pub emergency_halt_on_start: bool,
    pub gate: SafetyGateConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 5,
            cycle_interval_ms: 60_000,
            emergency_halt_on_start: false,
            gate: SafetyGateConfig {
                max_gas_price: None,
                max_trade_size: rust_decimal::Decimal::new(10_000, 0),
                min_market_liquidity: rust_decimal::Decimal::new(50_000, 0),
                max_slippage_bps: rust_decimal::Decimal::new(50, 0),
                max_daily_rebalances: 10,
                balance_discrepancy_threshold: rust_decimal::Decimal::new(10, 2),
            },
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_consecutive_errors == 0 {
            return Err(OrchestratorError::InvalidConfig("max_consecutive_errors must be positive".into()));
        }
        self.gate.validate()?;
        Ok(())
    }
}
