//! The fixed pipeline's seven node bodies (spec.md §2 "context -> theorize -> evaluate -> select
//! -> risk-gate -> execute -> learn"). Each is a pure-ish function of `(deps, state, now)`
//! returning a [`CyclePartial`]; [`crate::orchestrator::Orchestrator`] is the only thing that
//! ever calls `apply`.

use crate::{
    deps::OrchestratorDeps,
    error::{OrchestratorError, Result},
    risk_context::RiskContext,
    state::{CyclePartial, CycleState, CycleStatus},
};
use chrono::{DateTime, Utc};
use conveyor_backtest::Bar;
use conveyor_execution::ExecutionOutcome;
use conveyor_queue::{publish_evaluation_result, EnqueueOptions, EvaluationJob, EvaluationResult, JobOutcome};
use conveyor_risk::{Anomaly, SafetyGateInput, SafetyGateReport};
use conveyor_strategy::{CandidateContext, CandidateIdea, Regime};
use rust_decimal::Decimal;
use std::collections::HashSet;

const CONTEXT_LOOKBACK_HOURS: i64 = 24;
const TREND_REGIME_THRESHOLD: f64 = 0.01;
const EVALUATE_POLL_INTERVAL_MS: u64 = 50;
const EVALUATE_MAX_POLLS: u32 = 100;

fn to_f64(value: Decimal) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(0.0)
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn derive_context(bars: &[Bar]) -> CandidateContext {
    let closes: Vec<f64> = bars.iter().map(|b| to_f64(b.close)).collect();
    let first = *closes.first().unwrap_or(&0.0);
    let last = *closes.last().unwrap_or(&0.0);
    let trend_strength = if first.abs() > f64::EPSILON { (last - first) / first } else { 0.0 };
    let returns: Vec<f64> = closes
        .windows(2)
        .map(|w| if w[0].abs() > f64::EPSILON { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect();
    let volatility = std_dev(&returns);

    let regime = if trend_strength > TREND_REGIME_THRESHOLD {
        Regime::Bullish
    } else if trend_strength < -TREND_REGIME_THRESHOLD {
        Regime::Bearish
    } else {
        Regime::Ranging
    };

    CandidateContext { regime, volatility, trend_strength }
}

/// Majority vote across instruments, ties broken in favour of `Ranging` (the conservative
/// default when the universe disagrees).
fn majority_regime(contexts: &[CandidateContext]) -> Regime {
    let bullish = contexts.iter().filter(|c| c.regime == Regime::Bullish).count();
    let bearish = contexts.iter().filter(|c| c.regime == Regime::Bearish).count();
    let ranging = contexts.iter().filter(|c| c.regime == Regime::Ranging).count();

    if bullish > bearish && bullish > ranging {
        Regime::Bullish
    } else if bearish > bullish && bearish > ranging {
        Regime::Bearish
    } else {
        Regime::Ranging
    }
}

fn merge_context(contexts: &[CandidateContext]) -> CandidateContext {
    let n = contexts.len().max(1) as f64;
    let volatility = contexts.iter().map(|c| c.volatility).sum::<f64>() / n;
    let trend_strength = contexts.iter().map(|c| c.trend_strength).sum::<f64>() / n;
    CandidateContext { regime: majority_regime(contexts), volatility, trend_strength }
}

/// Populates `state.context` from a fresh bar fetch across the configured instrument universe
/// (spec.md §2 "external feeds -> context node populates state").
pub async fn context(deps: &OrchestratorDeps, state: &CycleState, now: DateTime<Utc>) -> Result<CyclePartial> {
    let start = now - chrono::Duration::hours(CONTEXT_LOOKBACK_HOURS);
    let mut contexts = Vec::new();

    for &instrument in &deps.instruments {
        let bars = deps
            .bar_provider
            .get_bars(instrument, &deps.timeframe, start, now)
            .await
            .map_err(|error| OrchestratorError::Node(format!("bar provider: {error}")))?;
        if !bars.is_empty() {
            contexts.push(derive_context(&bars));
        }
    }

    if contexts.is_empty() {
        return Ok(CyclePartial::default()
            .with_step("context")
            .with_status(CycleStatus::SkippedEmpty("no bars available for any instrument".into()))
            .add_warning(state, "context: no bars available for any instrument", now));
    }

    let merged = merge_context(&contexts);
    let partial = CyclePartial { context: Some(merged), ..CyclePartial::default() };
    Ok(partial.with_step("context").add_thought(
        state,
        format!(
            "context derived from {} instrument(s): regime={}, volatility={:.4}, trend_strength={:.4}",
            contexts.len(),
            merged.regime,
            merged.volatility,
            merged.trend_strength
        ),
        now,
    ))
}

/// Asks the theorizer for candidate ideas under the freshly derived context, rejects invalid
/// ones, and stashes the survivors in the shared candidate store `evaluate`'s job handler reads
/// from by id.
pub async fn theorize(deps: &OrchestratorDeps, state: &CycleState, now: DateTime<Utc>) -> Result<CyclePartial> {
    let context = match state.context {
        Some(context) => context,
        None => {
            return Ok(CyclePartial::default()
                .with_step("theorize")
                .with_status(CycleStatus::SkippedEmpty("no context to theorize from".into())))
        }
    };

    let ideas = deps
        .theorizer
        .theorize(&context, &deps.instruments, now)
        .map_err(|error| OrchestratorError::Node(error.to_string()))?;

    let mut partial = CyclePartial::default().with_step("theorize");
    let mut valid = Vec::new();
    for idea in ideas {
        match conveyor_strategy::validate(&idea) {
            Ok(()) => valid.push(idea),
            Err(error) => {
                partial = partial.add_warning(state, format!("rejected candidate {}: {error}", idea.id), now);
            }
        }
    }

    if valid.is_empty() {
        return Ok(partial.with_status(CycleStatus::SkippedEmpty("theorizer produced no valid candidates".into())));
    }

    {
        let mut store = deps.candidates.write();
        for idea in &valid {
            store.insert(idea.id.clone(), idea.clone());
        }
    }

    let count = valid.len();
    partial.candidates = Some(valid);
    Ok(partial.add_thought(state, format!("theorized {count} valid candidate(s)"), now))
}

/// Enqueues one [`EvaluationJob`] per candidate and polls the queue for their results until all
/// have resolved or the poll budget is spent. A worker pool is assumed to be running
/// concurrently against the same queue (spec.md §2 "worker pool consumes jobs ... publishes
/// results").
pub async fn evaluate(deps: &OrchestratorDeps, state: &CycleState, now: DateTime<Utc>) -> Result<CyclePartial> {
    if state.candidates.is_empty() {
        return Ok(CyclePartial::default()
            .with_step("evaluate")
            .with_status(CycleStatus::SkippedEmpty("no candidates to evaluate".into())));
    }

    let mut job_ids = Vec::new();
    for candidate in &state.candidates {
        let Some(&instrument) = candidate.target_instruments.first() else { continue };
        let job = EvaluationJob {
            id: format!("{}-{}", state.cycle_id, candidate.id),
            candidate_id: candidate.id.clone(),
            instrument,
            timeframe: deps.timeframe.clone(),
            window_days: deps.evaluation_window_days,
            engine_config: deps.engine_config,
            priority: 0,
            attempt: 0,
            attempt_limit: 3,
        };
        let options = EnqueueOptions { job_id: Some(job.id.clone()), ..EnqueueOptions::default() };
        let id = deps
            .queue
            .enqueue(job, options)
            .await
            .map_err(|error| OrchestratorError::Node(format!("enqueue: {error}")))?;
        job_ids.push(id);
    }

    if job_ids.is_empty() {
        return Ok(CyclePartial::default()
            .with_step("evaluate")
            .with_status(CycleStatus::SkippedEmpty("no candidate had a target instrument".into())));
    }

    let mut results = Vec::new();
    let mut pending: HashSet<String> = job_ids.iter().cloned().collect();
    for _ in 0..EVALUATE_MAX_POLLS {
        if pending.is_empty() {
            break;
        }
        let mut resolved = Vec::new();
        for job_id in &pending {
            if let Ok(Some(result)) = deps.queue.result(job_id).await {
                results.push(result);
                resolved.push(job_id.clone());
            }
        }
        for id in resolved {
            pending.remove(&id);
        }
        if pending.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(EVALUATE_POLL_INTERVAL_MS)).await;
    }

    for result in &results {
        publish_evaluation_result(deps.event_bus.as_ref(), result, now);
    }

    let submitted = job_ids.len();
    let received = results.len();
    let partial = CyclePartial { evaluation_results: Some(results), ..CyclePartial::default() };
    let partial = partial.with_step("evaluate").add_thought(
        state,
        format!("collected {received} of {submitted} evaluation result(s)"),
        now,
    );

    if received == 0 {
        Ok(partial.with_status(CycleStatus::SkippedEmpty("no evaluation results arrived before the poll deadline".into())))
    } else {
        Ok(partial)
    }
}

fn best_result(results: &[EvaluationResult]) -> Option<&EvaluationResult> {
    results
        .iter()
        .filter(|r| match &r.outcome {
            JobOutcome::Success(report) => report.verdict.should_activate,
            JobOutcome::Failure(_) => false,
        })
        .max_by(|a, b| {
            let sharpe = |r: &EvaluationResult| match &r.outcome {
                JobOutcome::Success(report) => report.sharpe_ratio,
                JobOutcome::Failure(_) => f64::MIN,
            };
            sharpe(a).partial_cmp(&sharpe(b)).unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Derives a live [`conveyor_backtest::Signal`] for the chosen candidate. Direction follows the
/// prevailing market regime (bullish/ranging favour a long, bearish a short); size follows the
/// candidate's own risk budget. Entry/exit indicator logic lives with the deployment's
/// [`conveyor_strategy::StrategyAdapter`], not here (spec.md §1 Non-goals "strategy quality,
/// indicator math").
fn derive_signal(candidate: &CandidateIdea, context: Option<CandidateContext>, cycle_id: &str) -> conveyor_backtest::Signal {
    let side = match context.map(|c| c.regime) {
        Some(Regime::Bearish) => conveyor_backtest::Side::Short,
        _ => conveyor_backtest::Side::Long,
    };
    conveyor_backtest::Signal {
        id: format!("{cycle_id}-{}", candidate.id),
        // `validate()` rejects a candidate before it ever queues if `target_instruments` is
        // empty, so the first entry is always the traded instrument for a single-instrument
        // candidate; multi-instrument candidates are out of scope (spec.md §1 Non-goals).
        instrument: candidate.target_instruments[0],
        side,
        size_fraction: candidate.risk.max_position_fraction,
        stop_loss_fraction: Some(candidate.risk.stop_loss_fraction),
        take_profit_fraction: Some(candidate.risk.take_profit_fraction),
        reason: format!("selected candidate {} ({})", candidate.id, candidate.category),
    }
}

/// Ranks evaluation results and picks the strongest activatable candidate, if any.
pub async fn select(deps: &OrchestratorDeps, state: &CycleState, now: DateTime<Utc>) -> Result<CyclePartial> {
    let Some(winner) = best_result(&state.evaluation_results) else {
        return Ok(CyclePartial::default()
            .with_step("select")
            .with_status(CycleStatus::SkippedEmpty("no evaluation result was activatable".into())));
    };

    let candidate = deps.candidates.read().get(&winner.candidate_id).cloned();
    let Some(candidate) = candidate else {
        return Ok(CyclePartial::default()
            .with_step("select")
            .add_warning(state, format!("selected candidate {} missing from store", winner.candidate_id), now)
            .with_status(CycleStatus::SkippedEmpty("selected candidate no longer available".into())));
    };

    let signal = derive_signal(&candidate, state.context, &state.cycle_id);
    let partial = CyclePartial {
        selected: Some(Some(candidate.clone())),
        signal: Some(Some(signal)),
        ..CyclePartial::default()
    };
    Ok(partial.with_step("select").add_thought(state, format!("selected candidate {}", candidate.id), now))
}

/// Gathers a [`RiskContext`] snapshot and the current daily-rebalance count, then runs the
/// safety-gate battery (spec.md §4.3 "Safety gate").
pub async fn risk_gate(deps: &OrchestratorDeps, state: &CycleState, now: DateTime<Utc>) -> Result<CyclePartial> {
    let (Some(candidate), Some(signal)) = (&state.selected, &state.signal) else {
        return Ok(CyclePartial::default()
            .with_step("risk-gate")
            .with_status(CycleStatus::SkippedEmpty("nothing selected to gate".into())));
    };

    let RiskContext {
        venue_gas_price,
        market_liquidity,
        estimated_slippage_bps,
        detected_anomalies,
        reported_balance,
        reconstructed_balance,
    } = deps.risk_context.snapshot(candidate, now).await;

    let day_bucket = now.format("%Y-%m-%d").to_string();
    let daily_rebalance_count = deps
        .persistence
        .daily_rebalance_count(&day_bucket)
        .await
        .map_err(OrchestratorError::Node)?;

    let anomalies: Vec<Anomaly> = detected_anomalies;
    let input = SafetyGateInput {
        emergency_halt: false,
        venue_gas_price,
        trade_size: signal.size_fraction,
        market_liquidity,
        estimated_slippage_bps,
        detected_anomalies: &anomalies,
        daily_rebalance_count,
        reported_balance,
        reconstructed_balance,
    };

    let report: SafetyGateReport = deps.gate.evaluate(now, &input);
    let passed = report.passed;
    if passed {
        deps.persistence
            .increment_daily_rebalance(&day_bucket)
            .await
            .map_err(OrchestratorError::Node)?;
    }

    let partial = CyclePartial { risk_assessment: Some(Some(report)), ..CyclePartial::default() };
    let partial = partial.with_step("risk-gate");
    if passed {
        Ok(partial.add_thought(state, "safety gate passed", now))
    } else {
        Ok(partial.with_status(CycleStatus::SkippedSafetyGate).add_warning(state, "safety gate rejected the candidate", now))
    }
}

/// Performs the real trade, unless the gate rejected it — a rejection is not a breaker trip, so
/// it does not halt the cycle; `learn` still runs afterwards (spec.md §7 "Safety-gate fail ...
/// surface, tolerate cycle").
pub async fn execute(deps: &OrchestratorDeps, state: &CycleState, now: DateTime<Utc>) -> Result<CyclePartial> {
    let Some(signal) = &state.signal else {
        return Ok(CyclePartial::default()
            .with_step("execute")
            .with_status(CycleStatus::SkippedEmpty("no signal to execute".into())));
    };
    let Some(report) = &state.risk_assessment else {
        return Ok(CyclePartial::default()
            .with_step("execute")
            .with_status(CycleStatus::SkippedSafetyGate));
    };

    if !report.passed {
        return Ok(CyclePartial::default()
            .with_step("execute")
            .with_status(CycleStatus::SkippedSafetyGate)
            .add_warning(state, "execute skipped: safety gate did not pass", now));
    }

    let outcome: ExecutionOutcome = deps
        .executor
        .execute(signal, report)
        .await
        .map_err(|error| OrchestratorError::Node(error.to_string()))?;

    let accepted = outcome.accepted;
    let partial = CyclePartial { execution_outcome: Some(Some(outcome)), ..CyclePartial::default() };
    Ok(partial
        .with_step("execute")
        .add_thought(state, format!("execution outcome recorded, accepted={accepted}"), now))
}

/// Persists the cycle's evaluation results and the selected strategy's snapshot; the learning
/// step in this core is recording, not retraining (spec.md §1 Non-goals "strategy quality").
pub async fn learn(deps: &OrchestratorDeps, state: &CycleState, now: DateTime<Utc>) -> Result<CyclePartial> {
    for result in &state.evaluation_results {
        deps.persistence
            .upsert_backtest_result(result)
            .await
            .map_err(OrchestratorError::Node)?;
    }

    if let Some(candidate) = &state.selected {
        let last_result = state
            .evaluation_results
            .iter()
            .find(|r| r.candidate_id == candidate.id)
            .cloned();
        let snapshot = crate::persistence::StrategySnapshot {
            candidate: candidate.clone(),
            last_result,
            active: state.execution_outcome.as_ref().map(|o| o.accepted).unwrap_or(false),
        };
        deps.persistence
            .upsert_strategy(&snapshot)
            .await
            .map_err(OrchestratorError::Node)?;
    }

    // A prior step may already have tagged this cycle with a more specific terminal status
    // (`SkippedEmpty`, `SkippedSafetyGate`); `learn` only claims `Completed` when nothing upstream
    // already decided the outcome (spec.md §8 "S5": a safety-gate rejection must still read as
    // rejected at the final step, not `Completed`).
    let mut partial = CyclePartial::default().with_step("learn").add_thought(state, "cycle recorded", now);
    if state.status == CycleStatus::Running {
        partial = partial.with_status(CycleStatus::Completed);
    }
    Ok(partial)
}
