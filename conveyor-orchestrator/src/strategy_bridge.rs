//! Bridges a [`CandidateIdea`] to the two shapes its signal logic must run under:
//! [`StrategyAdapter`] (context + bar, the live pipeline's boundary) and
//! [`conveyor_backtest::Strategy`] (position + bar, what the backtest engine's per-bar loop
//! drives) — the composition `conveyor_strategy::adapter`'s own doc comment anticipates
//! ("An implementation of `StrategyAdapter` is expected to also implement
//! `conveyor_backtest::Strategy` (or wrap one)").
//!
//! This is also where an [`EvaluationJob`] becomes a real backtest run: [`CandidateJobHandler`]
//! implements [`conveyor_queue::JobHandler`], the seam a [`conveyor_queue::Worker`] calls per
//! claimed job.

use conveyor_backtest::{Bar, BarProvider, BacktestEngine, ExitSignal, OpenPosition, Signal, Strategy};
use conveyor_queue::{EvaluationJob, EvaluationResult, JobHandler, JobOutcome};
use conveyor_strategy::{CandidateContext, CandidateIdea, Regime, StrategyAdapter};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// Shared within one cycle: the theorize node populates it, the evaluate node's job handler
/// reads it by candidate id — a [`conveyor_queue::JobHandler`] only receives an
/// [`EvaluationJob`], not the full [`CandidateIdea`] it was submitted for.
pub type CandidateStore = Arc<RwLock<HashMap<String, CandidateIdea>>>;

/// Produces the [`StrategyAdapter`] a candidate's signal logic runs under. What makes a good
/// strategy is out of scope for the core (spec.md §1 Non-goals "strategy quality, indicator
/// math"); this trait is the seam a deployment plugs its actual strategy catalog into.
pub trait StrategyAdapterFactory: Send + Sync {
    fn build(&self, candidate: &CandidateIdea) -> Arc<dyn StrategyAdapter + Send + Sync>;
}

fn neutral_context() -> CandidateContext {
    CandidateContext { regime: Regime::Ranging, volatility: 0.0, trend_strength: 0.0 }
}

/// Adapts a [`StrategyAdapter`] (context-aware) into [`conveyor_backtest::Strategy`]
/// (position-aware) by holding the context fixed for the duration of one backtest replay —
/// the engine never updates it per-bar since regime detection is explicitly out of scope here.
struct AdaptedStrategy {
    adapter: Arc<dyn StrategyAdapter + Send + Sync>,
    context: CandidateContext,
}

impl Strategy for AdaptedStrategy {
    fn generate_signals(&self, bar: &Bar, _position: Option<&OpenPosition>) -> Vec<Signal> {
        self.adapter.generate_signals(&self.context, bar)
    }

    fn exit(&self, bar: &Bar, position: &OpenPosition) -> Option<ExitSignal> {
        self.adapter.exit(bar, position)
    }
}

/// Turns one [`EvaluationJob`] into a [`BacktestEngine`] run. A strategy panic during replay is
/// caught and reported with the `strategy-error:` prefix [`conveyor_queue::Worker`] recognizes
/// to skip the retry/backoff policy entirely (spec.md §7 "Strategy exception ... do not retry").
pub struct CandidateJobHandler {
    bar_provider: Arc<dyn BarProvider>,
    candidates: CandidateStore,
    strategy_factory: Arc<dyn StrategyAdapterFactory>,
}

impl CandidateJobHandler {
    pub fn new(
        bar_provider: Arc<dyn BarProvider>,
        candidates: CandidateStore,
        strategy_factory: Arc<dyn StrategyAdapterFactory>,
    ) -> Self {
        Self { bar_provider, candidates, strategy_factory }
    }
}

#[async_trait::async_trait]
impl JobHandler for CandidateJobHandler {
    async fn handle(&self, job: EvaluationJob) -> std::result::Result<(EvaluationResult, usize), String> {
        let candidate = self
            .candidates
            .read()
            .get(&job.candidate_id)
            .cloned()
            .ok_or_else(|| format!("unknown candidate {}", job.candidate_id))?;

        let end = chrono::Utc::now();
        let start = end - chrono::Duration::days(job.window_days as i64);
        let bars = self
            .bar_provider
            .get_bars(job.instrument, &job.timeframe, start, end)
            .await
            .map_err(|error| error.to_string())?;

        if bars.is_empty() {
            // spec.md §7 "Data absent ... cycle step returns *_EMPTY" applies at the orchestrator
            // level; at the job level an empty bar series simply fails this one evaluation job so
            // the worker's normal retry/backoff policy applies (a later attempt may find data).
            return Err("no bars available for evaluation window".to_string());
        }

        let adapter = self.strategy_factory.build(&candidate);
        let context = candidate.context.unwrap_or_else(neutral_context);
        let strategy = AdaptedStrategy { adapter, context };
        let engine = BacktestEngine::new(&strategy, job.engine_config);

        let started = std::time::Instant::now();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| engine.run(&bars)));
        let processing_time_ms = started.elapsed().as_millis() as u64;

        let report = match outcome {
            Ok(Ok(report)) => report,
            Ok(Err(error)) => return Err(format!("strategy-error:{error}")),
            Err(_) => return Err("strategy-error:strategy callback panicked".to_string()),
        };

        let bars_processed = bars.len();
        Ok((
            EvaluationResult {
                job_id: job.id,
                candidate_id: job.candidate_id,
                attempt: job.attempt,
                outcome: JobOutcome::Success(report),
                processing_time_ms,
                bars_processed,
            },
            bars_processed,
        ))
    }
}
