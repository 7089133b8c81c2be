use chrono::{DateTime, Utc};
use conveyor_backtest::{EngineConfig, PerformanceReport};
use conveyor_instrument::InstrumentIndex;
use serde::{Deserialize, Serialize};

/// One unit of backtest evaluation work, submitted by the orchestrator's `evaluate` node and
/// consumed by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationJob {
    pub id: String,
    pub candidate_id: String,
    pub instrument: InstrumentIndex,
    pub timeframe: String,
    pub window_days: u32,
    pub engine_config: EngineConfig,
    pub priority: i32,
    pub attempt: u32,
    pub attempt_limit: u32,
}

impl EvaluationJob {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempt >= self.attempt_limit
    }
}

/// Outcome of processing one [`EvaluationJob`], published keyed by `(job_id, attempt)` so
/// redelivery after a stall never produces more than one accepted result per job id (spec.md
/// §4.2 "At-least-once guarantees").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub job_id: String,
    pub candidate_id: String,
    pub attempt: u32,
    pub outcome: JobOutcome,
    pub processing_time_ms: u64,
    pub bars_processed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobOutcome {
    Success(PerformanceReport),
    Failure(String),
}

impl EvaluationResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Success(_))
    }
}

/// Backoff policy applied between redelivered attempts (spec.md §4.2 "Backoff policy").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base_ms: 5_000 }
    }
}

impl BackoffPolicy {
    /// `delay(n) = base * 2^(n-1)` for 1-indexed attempt `n`.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let attempt = attempt.max(1);
        self.base_ms.saturating_mul(1u64 << (attempt - 1).min(32))
    }
}

/// Submission options accepted by [`crate::Queue::enqueue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueOptions {
    pub priority: i32,
    pub attempts: u32,
    pub backoff: BackoffPolicy,
    pub retain_completed: RetentionPolicy,
    pub retain_failed: RetentionPolicy,
    /// Caller-supplied job id for idempotent submission; re-submitting the same id is a no-op.
    pub job_id: Option<String>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            attempts: 3,
            backoff: BackoffPolicy::default(),
            retain_completed: RetentionPolicy { count: 1_000, age_secs: 24 * 3_600 },
            retain_failed: RetentionPolicy { count: 1_000, age_secs: 24 * 3_600 },
            job_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub count: usize,
    pub age_secs: i64,
}

/// Point-in-time counts exposed by [`crate::Queue::counts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}

/// Internal bookkeeping for one enqueued job, independent of transport.
#[derive(Debug, Clone)]
pub(crate) struct QueuedJob {
    pub job: EvaluationJob,
    pub options: EnqueueOptions,
    pub enqueued_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
}
