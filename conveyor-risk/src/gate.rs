//! Pre-execution safety gate: an ordered battery of checks that must all pass before the
//! executor step of the pipeline runs.

use chrono::{DateTime, Utc};
use conveyor_breaker::{BreakerConfig, BreakerRegistry};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Crate-local `Result` alias for gate construction errors.
pub type Result<T> = std::result::Result<T, GateError>;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("safety gate config invalid: {0}")]
    InvalidConfig(String),
}

/// Severity of a failed [`SafetyCheck`]. Only [`Severity::Critical`] additionally opens the
/// execute breaker; lower severities are recorded as warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Result of a single named check in the gate's battery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub name: String,
    pub passed: bool,
    pub reason: Option<String>,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl SafetyCheck {
    fn pass(name: &str, severity: Severity, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            reason: None,
            severity,
            timestamp,
        }
    }

    fn fail(name: &str, severity: Severity, reason: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            reason: Some(reason.into()),
            severity,
            timestamp,
        }
    }
}

/// A detected market or account anomaly, fed in from whatever anomaly-detection source the
/// deployment wires up; the gate only cares about its [`Severity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub severity: Severity,
    pub description: String,
}

/// Thresholds the gate's checks evaluate candidate trades against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SafetyGateConfig {
    pub max_gas_price: Option<Decimal>,
    pub max_trade_size: Decimal,
    pub min_market_liquidity: Decimal,
    pub max_slippage_bps: Decimal,
    pub max_daily_rebalances: u32,
    pub balance_discrepancy_threshold: Decimal,
}

impl SafetyGateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_trade_size <= Decimal::ZERO {
            return Err(GateError::InvalidConfig("max_trade_size must be positive".into()));
        }
        if self.balance_discrepancy_threshold <= Decimal::ZERO {
            return Err(GateError::InvalidConfig(
                "balance_discrepancy_threshold must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Everything one gate evaluation needs to know about the candidate trade and current account
/// state. Borrowed rather than owned since the gate only reads it.
pub struct SafetyGateInput<'a> {
    pub emergency_halt: bool,
    pub venue_gas_price: Option<Decimal>,
    pub trade_size: Decimal,
    pub market_liquidity: Decimal,
    pub estimated_slippage_bps: Decimal,
    pub detected_anomalies: &'a [Anomaly],
    pub daily_rebalance_count: u32,
    pub reported_balance: Decimal,
    pub reconstructed_balance: Decimal,
}

/// Outcome of one full gate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyGateReport {
    pub passed: bool,
    pub is_paused: bool,
    pub pause_reason: Option<String>,
    pub checks: Vec<SafetyCheck>,
    pub timestamp: DateTime<Utc>,
}

/// Ordered battery of pre-execution checks. Execute proceeds iff every check passes; any failed
/// check is recorded at its severity, and a [`Severity::Critical`] failure additionally opens
/// the named execute breaker. The gate runs under its own breaker; a panicking check is treated
/// as a rejected gate (fail-closed), never propagated.
pub struct SafetyGate {
    config: SafetyGateConfig,
    breakers: Arc<BreakerRegistry>,
    execute_breaker_name: String,
    gate_breaker_name: String,
}

impl SafetyGate {
    pub fn new(
        config: SafetyGateConfig,
        breakers: Arc<BreakerRegistry>,
        execute_breaker_name: impl Into<String>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            breakers,
            execute_breaker_name: execute_breaker_name.into(),
            gate_breaker_name: "safety-gate".to_string(),
        })
    }

    pub fn evaluate(&self, now: DateTime<Utc>, input: &SafetyGateInput<'_>) -> SafetyGateReport {
        let config = self.config;
        let execute_breaker = self.execute_breaker_name.clone();
        let breakers = Arc::clone(&self.breakers);

        let outcome = self.breakers.execute(
            &self.gate_breaker_name,
            BreakerConfig::rpc(),
            || -> std::result::Result<Vec<SafetyCheck>, ()> {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    run_checks(now, &config, &execute_breaker, &breakers, input)
                }))
                .map_err(|_| ())
            },
            None::<fn() -> Vec<SafetyCheck>>,
        );

        match outcome {
            Ok(checks) => {
                let failed: Vec<&SafetyCheck> = checks.iter().filter(|c| !c.passed).collect();
                let passed = failed.is_empty();
                let critical = failed.iter().find(|c| c.severity == Severity::Critical);

                if let Some(critical) = critical {
                    self.breakers
                        .open_breaker(&self.execute_breaker_name, BreakerConfig::execute());
                    SafetyGateReport {
                        passed,
                        is_paused: true,
                        pause_reason: Some(pause_reason(critical)),
                        checks,
                        timestamp: now,
                    }
                } else {
                    SafetyGateReport {
                        passed,
                        is_paused: !passed,
                        pause_reason: failed.first().map(|c| pause_reason(c)),
                        checks,
                        timestamp: now,
                    }
                }
            }
            Err(_) => SafetyGateReport {
                passed: false,
                is_paused: true,
                pause_reason: Some("safety gate raised an exception".to_string()),
                checks: Vec::new(),
                timestamp: now,
            },
        }
    }
}

/// `{name}: {reason}` so a caller can match on the failing check's name alone (spec.md §8 "S5"
/// expects `pauseReason` to contain the check name, e.g. `anomaly_detection`).
fn pause_reason(check: &SafetyCheck) -> String {
    match &check.reason {
        Some(reason) => format!("{}: {reason}", check.name),
        None => check.name.clone(),
    }
}

fn run_checks(
    now: DateTime<Utc>,
    config: &SafetyGateConfig,
    execute_breaker_name: &str,
    breakers: &BreakerRegistry,
    input: &SafetyGateInput<'_>,
) -> Vec<SafetyCheck> {
    let mut checks = Vec::with_capacity(9);

    checks.push(match breakers.get_status(execute_breaker_name) {
        Ok(status) if status.is_open => SafetyCheck::fail(
            "execute_breaker",
            Severity::Critical,
            "execute breaker is open",
            now,
        ),
        _ => SafetyCheck::pass("execute_breaker", Severity::Info, now),
    });

    checks.push(if input.emergency_halt {
        SafetyCheck::fail("emergency_halt", Severity::Critical, "emergency halt is set", now)
    } else {
        SafetyCheck::pass("emergency_halt", Severity::Info, now)
    });

    checks.push(match (config.max_gas_price, input.venue_gas_price) {
        (Some(max), Some(actual)) if actual > max => SafetyCheck::fail(
            "gas_price_limit",
            Severity::Warning,
            format!("gas price {actual} exceeds limit {max}"),
            now,
        ),
        _ => SafetyCheck::pass("gas_price_limit", Severity::Info, now),
    });

    checks.push(if input.trade_size > config.max_trade_size {
        SafetyCheck::fail(
            "max_trade_size",
            Severity::Critical,
            format!("trade size {} exceeds max {}", input.trade_size, config.max_trade_size),
            now,
        )
    } else {
        SafetyCheck::pass("max_trade_size", Severity::Info, now)
    });

    checks.push(if input.market_liquidity < config.min_market_liquidity {
        SafetyCheck::fail(
            "min_market_liquidity",
            Severity::Warning,
            format!(
                "market liquidity {} below minimum {}",
                input.market_liquidity, config.min_market_liquidity
            ),
            now,
        )
    } else {
        SafetyCheck::pass("min_market_liquidity", Severity::Info, now)
    });

    checks.push(if input.estimated_slippage_bps > config.max_slippage_bps {
        SafetyCheck::fail(
            "slippage_tolerance",
            Severity::Warning,
            format!(
                "estimated slippage {} bps exceeds tolerance {} bps",
                input.estimated_slippage_bps, config.max_slippage_bps
            ),
            now,
        )
    } else {
        SafetyCheck::pass("slippage_tolerance", Severity::Info, now)
    });

    checks.push(
        match input
            .detected_anomalies
            .iter()
            .max_by_key(|anomaly| anomaly.severity)
        {
            Some(anomaly) if anomaly.severity >= Severity::Warning => SafetyCheck::fail(
                "anomaly_detection",
                anomaly.severity,
                format!("anomaly detected: {}", anomaly.description),
                now,
            ),
            _ => SafetyCheck::pass("anomaly_detection", Severity::Info, now),
        },
    );

    checks.push(if input.daily_rebalance_count >= config.max_daily_rebalances {
        SafetyCheck::fail(
            "daily_rebalance_cap",
            Severity::Warning,
            format!(
                "daily rebalance count {} reached cap {}",
                input.daily_rebalance_count, config.max_daily_rebalances
            ),
            now,
        )
    } else {
        SafetyCheck::pass("daily_rebalance_cap", Severity::Info, now)
    });

    checks.push({
        let discrepancy = if input.reported_balance.is_zero() {
            Decimal::ZERO
        } else {
            ((input.reported_balance - input.reconstructed_balance) / input.reported_balance).abs()
        };

        if discrepancy > config.balance_discrepancy_threshold {
            SafetyCheck::fail(
                "balance_discrepancy",
                Severity::Critical,
                format!(
                    "reported/reconstructed balance discrepancy {discrepancy} exceeds threshold {}",
                    config.balance_discrepancy_threshold
                ),
                now,
            )
        } else {
            SafetyCheck::pass("balance_discrepancy", Severity::Info, now)
        }
    });

    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_input() -> SafetyGateInput<'static> {
        SafetyGateInput {
            emergency_halt: false,
            venue_gas_price: None,
            trade_size: dec!(100),
            market_liquidity: dec!(100_000),
            estimated_slippage_bps: dec!(5),
            detected_anomalies: &[],
            daily_rebalance_count: 0,
            reported_balance: dec!(10_000),
            reconstructed_balance: dec!(10_000),
        }
    }

    fn config() -> SafetyGateConfig {
        SafetyGateConfig {
            max_gas_price: None,
            max_trade_size: dec!(1_000),
            min_market_liquidity: dec!(10_000),
            max_slippage_bps: dec!(50),
            max_daily_rebalances: 10,
            balance_discrepancy_threshold: dec!(0.10),
        }
    }

    #[test]
    fn all_checks_pass_on_clean_input() {
        let gate = SafetyGate::new(config(), Arc::new(BreakerRegistry::new()), "execute").unwrap();
        let report = gate.evaluate(Utc::now(), &base_input());
        assert!(report.passed);
        assert!(!report.is_paused);
    }

    #[test]
    fn critical_anomaly_rejects_and_opens_execute_breaker() {
        let breakers = Arc::new(BreakerRegistry::new());
        let gate = SafetyGate::new(config(), Arc::clone(&breakers), "execute").unwrap();

        let anomalies = [Anomaly {
            severity: Severity::Critical,
            description: "unexpected venue disconnect".to_string(),
        }];
        let mut input = base_input();
        input.detected_anomalies = &anomalies;

        let report = gate.evaluate(Utc::now(), &input);
        assert!(!report.passed);
        assert!(report.is_paused);
        assert!(report.pause_reason.unwrap().contains("anomaly_detection"));
        assert!(breakers.get_status("execute").unwrap().is_open);
    }

    #[test]
    fn balance_discrepancy_over_threshold_fails() {
        let gate = SafetyGate::new(config(), Arc::new(BreakerRegistry::new()), "execute").unwrap();
        let mut input = base_input();
        input.reconstructed_balance = dec!(8_000);

        let report = gate.evaluate(Utc::now(), &input);
        assert!(!report.passed);
        assert!(
            report
                .checks
                .iter()
                .any(|c| c.name == "balance_discrepancy" && !c.passed)
        );
    }
}
