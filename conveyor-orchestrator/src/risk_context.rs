//! The market/venue facts the risk-gate node needs that the core has no opinion on how to
//! obtain (spec.md §1 "external collaborators accessed through the narrow interfaces in §6").
//! Gas price, pool liquidity, anomaly feeds and balance reconciliation are all venue- and
//! deployment-specific; this module is the seam a deployment plugs them in through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_risk::Anomaly;
use conveyor_strategy::CandidateIdea;
use rust_decimal::Decimal;

/// Snapshot of the external facts [`conveyor_risk::SafetyGate::evaluate`] needs, fetched fresh
/// for the candidate about to be risk-gated.
#[derive(Debug, Clone)]
pub struct RiskContext {
    pub venue_gas_price: Option<Decimal>,
    pub market_liquidity: Decimal,
    pub estimated_slippage_bps: Decimal,
    pub detected_anomalies: Vec<Anomaly>,
    pub reported_balance: Decimal,
    pub reconstructed_balance: Decimal,
}

#[async_trait]
pub trait RiskContextProvider: Send + Sync {
    async fn snapshot(&self, candidate: &CandidateIdea, now: DateTime<Utc>) -> RiskContext;
}

/// Fixed-answer provider for tests and for deployments with no live venue feed yet.
pub struct StaticRiskContext(pub RiskContext);

#[async_trait]
impl RiskContextProvider for StaticRiskContext {
    async fn snapshot(&self, _candidate: &CandidateIdea, _now: DateTime<Utc>) -> RiskContext {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_fixed_snapshot() {
        let ctx = RiskContext {
            venue_gas_price: Some(Decimal::new(30, 0)),
            market_liquidity: Decimal::new(100_000, 0),
            estimated_slippage_bps: Decimal::new(5, 0),
            detected_anomalies: vec![],
            reported_balance: Decimal::new(1000, 0),
            reconstructed_balance: Decimal::new(1000, 0),
        };
        let provider = StaticRiskContext(ctx.clone());
        let candidate = CandidateIdea::new(
            "c1".into(),
            "test".into(),
            conveyor_strategy::Category::TrendFollowing,
            vec![],
            "1h".into(),
            conveyor_strategy::RiskParameters {
                max_position_fraction: Decimal::new(1, 1),
                stop_loss_fraction: Decimal::new(1, 2),
                take_profit_fraction: Decimal::new(2, 2),
                max_leverage: Decimal::new(1, 0),
            },
            0.5,
            "rationale".into(),
            None,
            Utc::now(),
        );
        let snap = provider.snapshot(&candidate, Utc::now()).await;
        assert_eq!(snap.market_liquidity, ctx.market_liquidity);
    }
}
