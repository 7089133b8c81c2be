use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_backtest::Signal;
use conveyor_instrument::InstrumentIndex;
use conveyor_risk::SafetyGateReport;
use rust_decimal::Decimal;

use crate::{
    error::{ExecutionError, Result},
    executor::{ExecutionOutcome, VenueExecutor},
};

/// Deterministic executor for tests: fills every signal at a fixed price with no slippage,
/// charging a configurable flat commission rate. Never talks to a real venue.
pub struct SimulatedExecutor {
    fill_price: Decimal,
    commission_rate: Decimal,
    now: fn() -> DateTime<Utc>,
}

impl SimulatedExecutor {
    pub fn new(fill_price: Decimal, commission_rate: Decimal) -> Self {
        Self {
            fill_price,
            commission_rate,
            now: Utc::now,
        }
    }

    /// Override the time source for deterministic tests.
    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

#[async_trait]
impl VenueExecutor for SimulatedExecutor {
    async fn execute(&self, signal: &Signal, decision: &SafetyGateReport) -> Result<ExecutionOutcome> {
        if !decision.passed {
            return Err(ExecutionError::Rejected(
                decision.pause_reason.clone().unwrap_or_else(|| "safety gate did not approve".to_string()),
            ));
        }

        let notional = self.fill_price * signal.size_fraction;
        let commission = notional * self.commission_rate;

        Ok(ExecutionOutcome {
            signal_id: signal.id.clone(),
            instrument: signal.instrument,
            side: signal.side,
            accepted: true,
            filled_quantity: signal.size_fraction,
            fill_price: self.fill_price,
            commission,
            venue_order_id: Some(format!("sim-{}", signal.id)),
            executed_at: (self.now)(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_backtest::Side;
    use conveyor_risk::SafetyGateReport;
    use rust_decimal_macros::dec;

    fn approved_report() -> SafetyGateReport {
        SafetyGateReport {
            passed: true,
            is_paused: false,
            pause_reason: None,
            checks: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn rejected_report(reason: &str) -> SafetyGateReport {
        SafetyGateReport {
            passed: false,
            is_paused: true,
            pause_reason: Some(reason.to_string()),
            checks: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn signal() -> Signal {
        Signal {
            id: "sig-1".to_string(),
            instrument: InstrumentIndex::new(0),
            side: Side::Long,
            size_fraction: dec!(0.1),
            stop_loss_fraction: None,
            take_profit_fraction: None,
            reason: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn executes_fill_when_gate_approves() {
        let executor = SimulatedExecutor::new(dec!(100), dec!(0.001));
        let outcome = executor.execute(&signal(), &approved_report()).await.unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.fill_price, dec!(100));
        assert_eq!(outcome.signal_id, "sig-1");
    }

    #[tokio::test]
    async fn refuses_to_execute_when_gate_rejects() {
        let executor = SimulatedExecutor::new(dec!(100), dec!(0.001));
        let result = executor.execute(&signal(), &rejected_report("anomaly_detection")).await;
        assert!(matches!(result, Err(ExecutionError::Rejected(reason)) if reason == "anomaly_detection"));
    }
}
