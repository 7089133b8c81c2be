use crate::fill::FillModel;
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Engine configuration for one backtest run, carried on the [`crate::EvaluationJob`] that
/// spawned it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Constructor)]
pub struct EngineConfig {
    pub initial_capital: Decimal,
    pub fill_model: FillModel,
    pub commission_rate: Decimal,
    pub slippage_bps: Decimal,
    pub latency_ms: u64,
    pub random_seed: Option<u64>,
}
