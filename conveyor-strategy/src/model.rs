use chrono::{DateTime, Utc};
use conveyor_instrument::InstrumentIndex;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Strategy family a [`CandidateIdea`] belongs to. Carried through for bookkeeping only — the
/// core does not judge strategy quality by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    TrendFollowing,
    MeanReversion,
    MarketMaking,
    Arbitrage,
    MlPrediction,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Category::TrendFollowing => "trend-following",
            Category::MeanReversion => "mean-reversion",
            Category::MarketMaking => "market-making",
            Category::Arbitrage => "arbitrage",
            Category::MlPrediction => "ml-prediction",
        };
        write!(f, "{label}")
    }
}

/// Lifecycle tag for a [`CandidateIdea`] as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Rejected,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Status::Pending => "pending",
            Status::Queued => "queued",
            Status::Running => "running",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Rejected => "rejected",
        };
        write!(f, "{label}")
    }
}

/// Position-sizing and exit bounds a candidate proposes for itself, checked against the safety
/// gate's own limits before execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskParameters {
    pub max_position_fraction: Decimal,
    pub stop_loss_fraction: Decimal,
    pub take_profit_fraction: Decimal,
    pub max_leverage: Decimal,
}

/// Snapshot of the market regime the candidate was theorized under — informational only, not
/// consumed by the backtest engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateContext {
    pub regime: Regime,
    pub volatility: f64,
    pub trend_strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Bullish,
    Bearish,
    Ranging,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Regime::Bullish => "bullish",
            Regime::Bearish => "bearish",
            Regime::Ranging => "ranging",
        };
        write!(f, "{label}")
    }
}

/// A free-form entry or exit condition, carried through opaque to the core (spec: "entry and
/// exit condition lists (opaque strings carried through)").
pub type Condition = String;

/// A theorized trading strategy, not yet evaluated. Produced by a theorizer, queued for
/// backtest evaluation, and eventually selected, rejected, or retired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateIdea {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub target_instruments: Vec<InstrumentIndex>,
    pub timeframe: String,
    pub parameters: IndexMap<String, Decimal>,
    pub entry_conditions: Vec<Condition>,
    pub exit_conditions: Vec<Condition>,
    pub risk: RiskParameters,
    pub confidence: f64,
    pub rationale: String,
    pub status: Status,
    pub context: Option<CandidateContext>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CandidateIdea {
    /// `confidence` must already be validated to `[0, 1]` by the caller (see
    /// [`crate::theorizer::Theorizer::theorize`]); this constructor only stamps timestamps and
    /// the initial status.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: Category,
        target_instruments: Vec<InstrumentIndex>,
        timeframe: impl Into<String>,
        risk: RiskParameters,
        confidence: f64,
        rationale: impl Into<String>,
        context: Option<CandidateContext>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            target_instruments,
            timeframe: timeframe.into(),
            parameters: IndexMap::new(),
            entry_conditions: Vec::new(),
            exit_conditions: Vec::new(),
            risk,
            confidence,
            rationale: rationale.into(),
            status: Status::Pending,
            context,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: Status, now: DateTime<Utc>) -> Self {
        self.status = status;
        self.updated_at = now;
        self
    }
}
