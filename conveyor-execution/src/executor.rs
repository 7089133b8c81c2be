use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_backtest::{Side, Signal};
use conveyor_instrument::InstrumentIndex;
use conveyor_risk::SafetyGateReport;
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Result of one `VenueExecutor::execute` call, whether or not the trade itself was accepted by
/// the venue. Idempotency key is the originating signal's `id` (spec.md §6 "Venue executor").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Constructor)]
pub struct ExecutionOutcome {
    pub signal_id: String,
    pub instrument: InstrumentIndex,
    pub side: Side,
    pub accepted: bool,
    pub filled_quantity: Decimal,
    pub fill_price: Decimal,
    pub commission: Decimal,
    pub venue_order_id: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// External venue-execution boundary (spec.md §6): performs the real trade once the safety gate
/// has approved it. Implementations own the exchange-specific wire format; that surface is out
/// of scope for the core.
#[async_trait]
pub trait VenueExecutor: Send + Sync {
    async fn execute(&self, signal: &Signal, decision: &SafetyGateReport) -> Result<ExecutionOutcome>;
}
