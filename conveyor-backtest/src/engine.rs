//! Deterministic single-process backtest engine: replays a time-sorted bar sequence against a
//! [`Strategy`] under a [`SimulationClock`], simulating fills, stop-loss/take-profit exits,
//! commission and slippage, and produces a [`PerformanceReport`].

use crate::{
    config::EngineConfig,
    error::{BacktestError, Result},
    report::{classify, PerformanceReport, PerformanceThresholds},
    strategy::Strategy,
    types::{Bar, OpenPosition, Side, Trade},
};
use conveyor_clock::SimulationClock;
use conveyor_instrument::InstrumentIndex;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Runs one deterministic backtest of `strategy` over `bars` under `config`.
pub struct BacktestEngine<'a, S: Strategy> {
    strategy: &'a S,
    config: EngineConfig,
}

impl<'a, S: Strategy> BacktestEngine<'a, S> {
    pub fn new(strategy: &'a S, config: EngineConfig) -> Self {
        Self { strategy, config }
    }

    /// Replay `bars` in order. `bars` must be non-empty and time-sorted (strictly
    /// monotonic non-decreasing timestamps); violating either fails the run with a typed error
    /// and no partial report, per spec.md §4.1 "Failure semantics".
    pub fn run(&self, bars: &[Bar]) -> Result<PerformanceReport> {
        let first = *bars.first().ok_or(BacktestError::EmptyBars)?;
        for (index, pair) in bars.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(BacktestError::UnsortedBars {
                    index: index + 1,
                    timestamp: pair[1].timestamp,
                });
            }
        }

        let clock = SimulationClock::new(first.timestamp);
        let mut capital = self.config.initial_capital;
        let mut positions: HashMap<InstrumentIndex, OpenPosition> = HashMap::new();
        let mut trades: Vec<Trade> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut last_bar: HashMap<InstrumentIndex, Bar> = HashMap::new();
        let mut equity_curve: Vec<Decimal> = vec![capital];

        for bar in bars {
            clock
                .advance_to(bar.timestamp)
                .map_err(|error| BacktestError::StrategyError(error.to_string()))?;
            last_bar.insert(bar.instrument, *bar);

            if let Some(position) = positions.get(&bar.instrument).copied() {
                if let Some((exit_price, reason)) = triggered_exit(&position, bar, self.strategy) {
                    Self::close(&mut positions, &mut trades, &mut capital, &self.config, bar.instrument, bar, exit_price, reason);
                }
            }

            let open_position = positions.get(&bar.instrument).copied();
            if open_position.is_none() {
                for signal in self.strategy.generate_signals(bar, None) {
                    let fill_price = self.config.fill_model.fill_price(bar, signal.side, self.config.slippage_bps);
                    if fill_price <= Decimal::ZERO {
                        continue;
                    }
                    let notional = capital * signal.size_fraction;
                    if notional <= Decimal::ZERO {
                        continue;
                    }
                    let quantity = notional / fill_price;
                    let commission = notional * self.config.commission_rate;
                    capital -= commission;

                    let stop_loss_price = signal.stop_loss_fraction.map(|fraction| match signal.side {
                        Side::Long => fill_price * (Decimal::ONE - fraction),
                        Side::Short => fill_price * (Decimal::ONE + fraction),
                    });
                    let take_profit_price = signal.take_profit_fraction.map(|fraction| match signal.side {
                        Side::Long => fill_price * (Decimal::ONE + fraction),
                        Side::Short => fill_price * (Decimal::ONE - fraction),
                    });

                    positions.insert(
                        bar.instrument,
                        OpenPosition {
                            instrument: bar.instrument,
                            side: signal.side,
                            quantity,
                            avg_price: fill_price,
                            stop_loss_price,
                            take_profit_price,
                            opened_at: bar.timestamp,
                        },
                    );
                    break; // one open position per instrument at a time
                }
            }

            let unrealized: Decimal = positions
                .values()
                .filter(|position| position.instrument == bar.instrument)
                .map(|position| mark_to_market(position, bar))
                .sum();
            equity_curve.push(capital + unrealized);
        }

        let remaining: Vec<InstrumentIndex> = positions.keys().copied().collect();
        for instrument in remaining {
            match last_bar.get(&instrument) {
                Some(bar) => {
                    let position = positions[&instrument];
                    let exit_price = bar.close;
                    Self::close(&mut positions, &mut trades, &mut capital, &self.config, instrument, bar, exit_price, "end-of-series");
                }
                None => {
                    // No bar was ever observed for this instrument's close — per spec.md §9's
                    // resolved open question, mark to last observed mid and warn rather than
                    // silently excluding it from PnL.
                    warnings.push(format!(
                        "instrument {instrument} had no final close; marked to last observed mid"
                    ));
                    positions.remove(&instrument);
                }
            }
        }

        equity_curve.push(capital);
        Ok(build_report(
            self.config.initial_capital,
            capital,
            first.timestamp,
            bars.last().unwrap().timestamp,
            &equity_curve,
            trades,
            warnings,
            PerformanceThresholds::default(),
        ))
    }

    fn close(
        positions: &mut HashMap<InstrumentIndex, OpenPosition>,
        trades: &mut Vec<Trade>,
        capital: &mut Decimal,
        config: &EngineConfig,
        instrument: InstrumentIndex,
        bar: &Bar,
        exit_price: Decimal,
        _reason: &str,
    ) {
        let Some(position) = positions.remove(&instrument) else {
            return;
        };
        let notional = exit_price * position.quantity;
        let commission = notional * config.commission_rate;
        let pnl = (exit_price - position.avg_price) * position.side.sign() * position.quantity - commission;
        *capital += pnl;

        trades.push(Trade {
            instrument,
            side: position.side,
            quantity: position.quantity,
            entry_price: position.avg_price,
            exit_price,
            entry_time: position.opened_at,
            exit_time: bar.timestamp,
            commission,
            pnl,
        });
    }
}

/// Evaluate stop-loss/take-profit against the bar's extreme prices, then the strategy's own
/// exit condition. If both a stop-loss and take-profit would trigger within the same bar, the
/// tie-break is stop-loss first (conservative), per spec.md §4.1 step 3.
fn triggered_exit<S: Strategy>(position: &OpenPosition, bar: &Bar, strategy: &S) -> Option<(Decimal, &'static str)> {
    let stop_hit = position.stop_loss_price.is_some_and(|stop| match position.side {
        Side::Long => bar.low <= stop,
        Side::Short => bar.high >= stop,
    });
    if stop_hit {
        return Some((position.stop_loss_price.unwrap(), "stop-loss"));
    }

    let take_hit = position.take_profit_price.is_some_and(|take| match position.side {
        Side::Long => bar.high >= take,
        Side::Short => bar.low <= take,
    });
    if take_hit {
        return Some((position.take_profit_price.unwrap(), "take-profit"));
    }

    if strategy.exit(bar, position).is_some() {
        return Some((bar.close, "strategy-exit"));
    }

    None
}

fn mark_to_market(position: &OpenPosition, bar: &Bar) -> Decimal {
    (bar.close - position.avg_price) * position.side.sign() * position.quantity
}

#[allow(clippy::too_many_arguments)]
fn build_report(
    initial_capital: Decimal,
    final_capital: Decimal,
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
    equity_curve: &[Decimal],
    trades: Vec<Trade>,
    warnings: Vec<String>,
    thresholds: PerformanceThresholds,
) -> PerformanceReport {
    let total_return = if initial_capital.is_zero() {
        Decimal::ZERO
    } else {
        (final_capital - initial_capital) / initial_capital
    };

    let duration_secs = (end - start).num_seconds().max(1);
    let year_secs = Decimal::from(365 * 24 * 3600);
    let annualized_return = total_return * (year_secs / Decimal::from(duration_secs));

    let max_drawdown = max_drawdown(equity_curve);

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter(|pair| !pair[0].is_zero())
        .map(|pair| ((pair[1] - pair[0]) / pair[0]).to_string().parse::<f64>().unwrap_or(0.0))
        .collect();
    let sharpe_ratio = sharpe(&returns);
    let sortino_ratio = sortino(&returns);

    let wins: Vec<&Trade> = trades.iter().filter(|trade| trade.pnl > Decimal::ZERO).collect();
    let losses: Vec<&Trade> = trades.iter().filter(|trade| trade.pnl <= Decimal::ZERO).collect();
    let trade_count = trades.len() as u32;

    let win_rate = if trade_count == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(wins.len() as u64) * Decimal::from(100) / Decimal::from(trade_count)
    };

    let gross_profit: Decimal = wins.iter().map(|trade| trade.pnl).sum();
    let gross_loss: Decimal = losses.iter().map(|trade| trade.pnl).sum::<Decimal>().abs();
    let profit_factor = if gross_loss.is_zero() {
        if gross_profit.is_zero() { Decimal::ZERO } else { Decimal::from(i64::MAX) }
    } else {
        gross_profit / gross_loss
    };

    let avg_win = if wins.is_empty() { Decimal::ZERO } else { gross_profit / Decimal::from(wins.len() as u64) };
    let avg_loss = if losses.is_empty() { Decimal::ZERO } else { -gross_loss / Decimal::from(losses.len() as u64) };

    let win_fraction = win_rate / Decimal::from(100);
    let expectancy = win_fraction * avg_win + (Decimal::ONE - win_fraction) * avg_loss;

    let calmar_ratio = if max_drawdown.is_zero() { annualized_return } else { annualized_return / max_drawdown };
    let risk_adjusted_return = if max_drawdown.is_zero() { total_return } else { total_return / max_drawdown };

    let consistency_score = if equity_curve.len() < 2 {
        Decimal::ZERO
    } else {
        let non_negative = equity_curve.windows(2).filter(|pair| pair[1] >= pair[0]).count();
        Decimal::from(non_negative as u64) / Decimal::from((equity_curve.len() - 1) as u64)
    };

    let verdict = classify(sharpe_ratio, win_rate, max_drawdown, profit_factor, trade_count, thresholds);

    PerformanceReport {
        initial_capital,
        final_capital,
        total_return,
        annualized_return,
        max_drawdown,
        sharpe_ratio,
        win_rate,
        trade_count,
        profit_factor,
        calmar_ratio,
        sortino_ratio,
        avg_win,
        avg_loss,
        expectancy,
        risk_adjusted_return,
        consistency_score,
        trades,
        warnings,
        verdict,
    }
}

fn max_drawdown(equity_curve: &[Decimal]) -> Decimal {
    let mut peak = equity_curve.first().copied().unwrap_or(Decimal::ZERO);
    let mut worst = Decimal::ZERO;
    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        }
        if !peak.is_zero() {
            let drawdown = (peak - equity) / peak;
            if drawdown > worst {
                worst = drawdown;
            }
        }
    }
    worst
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|value| (value - mean_value).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn sharpe(returns: &[f64]) -> f64 {
    let mean_return = mean(returns);
    let deviation = std_dev(returns, mean_return);
    if deviation == 0.0 {
        if mean_return > 0.0 { f64::MAX } else { 0.0 }
    } else {
        mean_return / deviation
    }
}

fn sortino(returns: &[f64]) -> f64 {
    let mean_return = mean(returns);
    let downside: Vec<f64> = returns.iter().copied().filter(|value| *value < 0.0).collect();
    let downside_deviation = std_dev(&downside, 0.0);
    if downside_deviation == 0.0 {
        if mean_return > 0.0 { f64::MAX } else { 0.0 }
    } else {
        mean_return / downside_deviation
    }
}
