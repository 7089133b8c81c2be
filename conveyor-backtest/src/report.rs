use crate::types::Trade;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Discrete quality label derived from the fixed scoring in [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Excellent,
    Good,
    Acceptable,
    Poor,
    Rejected,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Excellent => "excellent",
            Tier::Good => "good",
            Tier::Acceptable => "acceptable",
            Tier::Poor => "poor",
            Tier::Rejected => "rejected",
        }
    }
}

/// Pass/fail thresholds a [`PerformanceReport`] is scored against.
///
/// Defaults follow spec.md §8 S2's worked example (Sharpe 1.5 / win rate 55 / drawdown 20 /
/// profit factor 1.3 / trades 10 sitting at the EXCELLENT boundary).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceThresholds {
    pub min_sharpe: f64,
    /// Percentage points, e.g. `55.0` for 55%.
    pub min_win_rate: Decimal,
    /// Fraction, e.g. `0.25` for 25% max drawdown.
    pub max_drawdown: Decimal,
    pub min_profit_factor: Decimal,
    pub min_total_trades: u32,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            min_sharpe: 1.0,
            min_win_rate: Decimal::from(55),
            max_drawdown: Decimal::new(25, 2),
            min_profit_factor: Decimal::new(12, 1),
            min_total_trades: 10,
        }
    }
}

/// Outcome of scoring a [`PerformanceReport`] against [`PerformanceThresholds`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub tier: Tier,
    pub viable: bool,
    pub should_activate: bool,
    pub reasons: Vec<String>,
    pub recommendations: Vec<String>,
    pub thresholds: PerformanceThresholds,
}

/// Score the five pass/fail checks per spec.md §4.1 "Performance tier rule (exact)":
/// `score = 2*sharpe_pass + 2*win_rate_pass + 1*drawdown_pass + 1*profit_factor_pass + 1*sample_pass`,
/// tier EXCELLENT (>=6), GOOD (5), ACCEPTABLE (4), POOR (2-3), REJECTED (<2). Viable iff Sharpe,
/// win rate and drawdown all pass; should-activate iff viable and the sample-size check passes.
pub fn classify(
    sharpe_ratio: f64,
    win_rate: Decimal,
    max_drawdown: Decimal,
    profit_factor: Decimal,
    trade_count: u32,
    thresholds: PerformanceThresholds,
) -> Verdict {
    let sharpe_pass = sharpe_ratio >= thresholds.min_sharpe;
    let win_rate_pass = win_rate >= thresholds.min_win_rate;
    let drawdown_pass = max_drawdown <= thresholds.max_drawdown;
    let profit_factor_pass = profit_factor >= thresholds.min_profit_factor;
    let sample_pass = trade_count >= thresholds.min_total_trades;

    let score = 2 * sharpe_pass as u8
        + 2 * win_rate_pass as u8
        + drawdown_pass as u8
        + profit_factor_pass as u8
        + sample_pass as u8;

    let tier = match score {
        6.. => Tier::Excellent,
        5 => Tier::Good,
        4 => Tier::Acceptable,
        2 | 3 => Tier::Poor,
        _ => Tier::Rejected,
    };

    let viable = sharpe_pass && win_rate_pass && drawdown_pass;
    let should_activate = viable && sample_pass;

    let mut reasons = Vec::new();
    let mut recommendations = Vec::new();
    if !sharpe_pass {
        reasons.push(format!(
            "Sharpe ratio {sharpe_ratio:.2} below minimum {:.2}",
            thresholds.min_sharpe
        ));
        recommendations.push("improve risk-adjusted returns before activation".to_string());
    }
    if !win_rate_pass {
        reasons.push(format!(
            "win rate {win_rate} below minimum {}",
            thresholds.min_win_rate
        ));
        recommendations.push("tighten entry conditions to raise win rate".to_string());
    }
    if !drawdown_pass {
        reasons.push(format!(
            "max drawdown {max_drawdown} exceeds limit {}",
            thresholds.max_drawdown
        ));
        recommendations.push("reduce position sizing to cap drawdown".to_string());
    }
    if !profit_factor_pass {
        reasons.push(format!(
            "profit factor {profit_factor} below minimum {}",
            thresholds.min_profit_factor
        ));
        recommendations.push("review exit rules to improve profit factor".to_string());
    }
    if !sample_pass {
        reasons.push(format!(
            "trade count {trade_count} below minimum sample size {}",
            thresholds.min_total_trades
        ));
        recommendations.push("extend the evaluation window to gather more trades".to_string());
    }

    Verdict {
        tier,
        viable,
        should_activate,
        reasons,
        recommendations,
        thresholds,
    }
}

/// Structured output of one [`crate::BacktestEngine::run`] invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub initial_capital: Decimal,
    pub final_capital: Decimal,
    pub total_return: Decimal,
    pub annualized_return: Decimal,
    pub max_drawdown: Decimal,
    pub sharpe_ratio: f64,
    /// Percentage points, e.g. `55.0` for 55%.
    pub win_rate: Decimal,
    pub trade_count: u32,
    pub profit_factor: Decimal,
    pub calmar_ratio: Decimal,
    pub sortino_ratio: f64,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub expectancy: Decimal,
    pub risk_adjusted_return: Decimal,
    pub consistency_score: Decimal,
    pub trades: Vec<Trade>,
    pub warnings: Vec<String>,
    pub verdict: Verdict,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// spec.md §8 "S2": Sharpe 1.5 / win rate 55 / drawdown 20% / profit factor 1.3 / 10 trades
    /// sits exactly at the EXCELLENT boundary (score 6).
    #[test]
    fn s2_worked_example_is_excellent_and_viable() {
        let verdict = classify(1.5, dec!(55), dec!(0.20), dec!(1.3), 10, PerformanceThresholds::default());
        assert_eq!(verdict.tier, Tier::Excellent);
        assert!(verdict.viable);
        assert!(verdict.should_activate);
    }

    /// Dropping win rate just under the 55 threshold must flip both `viable` and `tier`.
    #[test]
    fn s2_win_rate_just_below_threshold_flips_to_acceptable() {
        let verdict = classify(1.5, dec!(54.9), dec!(0.20), dec!(1.3), 10, PerformanceThresholds::default());
        assert_eq!(verdict.tier, Tier::Acceptable);
        assert!(!verdict.viable);
        assert!(!verdict.should_activate);
    }

    #[test]
    fn score_two_or_three_is_poor() {
        // sharpe fails, win_rate fails, drawdown passes, profit_factor passes, sample fails: score 2.
        let verdict = classify(0.1, dec!(10), dec!(0.05), dec!(2.0), 1, PerformanceThresholds::default());
        assert_eq!(verdict.tier, Tier::Poor);
        assert!(!verdict.viable);
    }

    #[test]
    fn score_below_two_is_rejected() {
        let verdict = classify(0.1, dec!(10), dec!(0.05), dec!(0.5), 1, PerformanceThresholds::default());
        assert_eq!(verdict.tier, Tier::Rejected);
        assert!(!verdict.viable);
    }

    #[test]
    fn should_activate_requires_sample_pass_even_when_viable() {
        let verdict = classify(1.5, dec!(60), dec!(0.10), dec!(1.5), 3, PerformanceThresholds::default());
        assert!(verdict.viable);
        assert!(!verdict.should_activate);
    }
}
