//! Placeholder implementations for the deployment-pluggable boundaries (spec.md §6): a bar
//! provider, a theorizer, and a strategy adapter factory. None of these express an actual
//! trading edge or a real market-data feed — a deployment replaces all three. They exist so the
//! binary links and runs a complete cycle end to end with nothing attached yet, the same role
//! the teacher's own paper-trading stubs play before a real exchange integration is wired in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_backtest::{Bar, BarProvider, ExitSignal, OpenPosition, Signal};
use conveyor_instrument::InstrumentIndex;
use conveyor_orchestrator::StrategyAdapterFactory;
use conveyor_strategy::{CandidateContext, CandidateIdea, Category, Result as StrategyResult, RiskParameters, StrategyAdapter, Theorizer};
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Always reports no bars. A cycle running against it never finds data, so `context` and
/// `evaluate` both end their steps as the "Data absent" empty outcome (spec.md §7) rather than
/// running against a fabricated market.
pub struct NullBarProvider;

#[async_trait]
impl BarProvider for NullBarProvider {
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

/// Produces no candidates. With this theorizer attached, `theorize` always ends the cycle as
/// `SKIPPED_EMPTY` before `evaluate` ever submits a job — the safe default until a real
/// candidate-generation strategy is configured.
pub struct NullTheorizer;

impl Theorizer for NullTheorizer {
    fn theorize(
        &self,
        _context: &CandidateContext,
        _instruments: &[InstrumentIndex],
        _now: DateTime<Utc>,
    ) -> StrategyResult<Vec<CandidateIdea>> {
        Ok(Vec::new())
    }
}

/// A theorizer that always proposes the same single candidate, useful for exercising the full
/// pipeline (including `evaluate`/`risk-gate`/`execute`) before a real strategy catalog exists.
pub struct FixedCandidateTheorizer {
    pub risk: RiskParameters,
}

impl Default for FixedCandidateTheorizer {
    fn default() -> Self {
        Self {
            risk: RiskParameters {
                max_position_fraction: dec!(0.1),
                stop_loss_fraction: dec!(0.02),
                take_profit_fraction: dec!(0.04),
                max_leverage: dec!(1),
            },
        }
    }
}

impl Theorizer for FixedCandidateTheorizer {
    fn theorize(
        &self,
        context: &CandidateContext,
        instruments: &[InstrumentIndex],
        now: DateTime<Utc>,
    ) -> StrategyResult<Vec<CandidateIdea>> {
        if instruments.is_empty() {
            return Ok(Vec::new());
        }
        let candidate = CandidateIdea::new(
            format!("fixed-{}", now.timestamp()),
            "fixed-candidate".to_string(),
            Category::TrendFollowing,
            instruments.to_vec(),
            "1h".to_string(),
            self.risk,
            0.5,
            "placeholder candidate, no deployed strategy configured",
            Some(*context),
            now,
        );
        Ok(vec![candidate])
    }
}

/// Generates no entry or exit signals. Paired with [`NullStrategyAdapterFactory`] so a deployed
/// candidate that has no real strategy logic attached still runs cleanly through `evaluate`
/// instead of the job handler failing for want of an adapter.
pub struct NullStrategyAdapter;

impl StrategyAdapter for NullStrategyAdapter {
    fn generate_signals(&self, _context: &CandidateContext, _bar: &Bar) -> Vec<Signal> {
        Vec::new()
    }

    fn exit(&self, _bar: &Bar, _position: &OpenPosition) -> Option<ExitSignal> {
        None
    }
}

pub struct NullStrategyAdapterFactory;

impl StrategyAdapterFactory for NullStrategyAdapterFactory {
    fn build(&self, _candidate: &CandidateIdea) -> Arc<dyn StrategyAdapter + Send + Sync> {
        Arc::new(NullStrategyAdapter)
    }
}
