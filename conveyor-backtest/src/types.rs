use chrono::{DateTime, Utc};
use conveyor_instrument::InstrumentIndex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV candle for a single instrument. `timestamp` must be strictly monotonic
/// non-decreasing across a replay's bar sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub instrument: InstrumentIndex,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub bid_size: Option<Decimal>,
    pub ask_size: Option<Decimal>,
    pub vwap: Option<Decimal>,
}

/// Direction of a position or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    pub fn sign(self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => -Decimal::ONE,
        }
    }
}

/// Entry instruction emitted by a [`crate::Strategy`] for the current bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Idempotency key for the venue executor (spec.md §6 "Venue executor").
    pub id: String,
    pub instrument: InstrumentIndex,
    pub side: Side,
    /// Fraction of available capital to commit, in `[0, 1]`.
    pub size_fraction: Decimal,
    pub stop_loss_fraction: Option<Decimal>,
    pub take_profit_fraction: Option<Decimal>,
    pub reason: String,
}

/// Exit instruction for an already-open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitSignal {
    pub reason: String,
}

/// A currently open position, as tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub instrument: InstrumentIndex,
    pub side: Side,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
}

/// A closed round-trip trade, recorded for the per-trade log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub instrument: InstrumentIndex,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub commission: Decimal,
    pub pnl: Decimal,
}
