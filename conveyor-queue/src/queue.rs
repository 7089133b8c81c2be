use crate::{
    error::Result,
    job::{EnqueueOptions, EvaluationJob, EvaluationResult, QueueCounts},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A job handed to a worker by [`Queue::claim`], paired with the lock token the worker must
/// present back to [`Queue::heartbeat`]/[`Queue::complete`]/[`Queue::fail`] to prove it still
/// holds exclusive ownership (spec.md §3 "a worker holds exclusive ownership of a job between
/// claim and either success, final failure, or stall expiry").
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub job: EvaluationJob,
    pub lock_token: String,
    pub claimed_at: DateTime<Utc>,
}

/// Durable job queue contract (spec.md §4.2 "Queue contract"). Jobs are delivered
/// at-least-once; a worker's processing must be idempotent in effect, result publication keyed
/// by job id so a duplicate redelivery is harmless downstream.
///
/// Implementations: [`crate::memory::InMemoryQueue`] (no external dependency, backs unit and
/// integration tests) and [`crate::redis_queue::RedisQueue`] (durable transport, spec.md §4.2
/// `[ADD]` "Transport").
#[async_trait]
pub trait Queue: Send + Sync {
    /// Submit a job. `options.job_id`, if set, makes submission idempotent: re-submitting the
    /// same id while the job is not yet in a terminal state is a no-op that returns the
    /// existing id.
    async fn enqueue(&self, job: EvaluationJob, options: EnqueueOptions) -> Result<String>;

    async fn counts(&self) -> Result<QueueCounts>;

    /// The recorded result for a job id, if its first terminal event has been observed.
    /// `None` while the job is still waiting/active, regardless of transport.
    async fn result(&self, job_id: &str) -> Result<Option<EvaluationResult>>;

    /// Stop accepting new claims. Jobs already active are unaffected.
    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn is_paused(&self) -> Result<bool>;

    /// Release the queue's transport connection. Idempotent.
    async fn close(&self) -> Result<()>;

    /// Claim the highest-priority available job (FIFO within a priority tier), holding it under
    /// an exclusive lock for `lock_duration_ms`. Returns `None` if the queue is paused, closed,
    /// or has no available job.
    async fn claim(&self, lock_duration_ms: u64) -> Result<Option<ClaimedJob>>;

    /// Reset the lock timer on a still-in-flight job, for long-running jobs that would
    /// otherwise be mistaken for stalled (spec.md §4.2 "Workers MAY publish an in-progress
    /// heartbeat to reset stall timing").
    async fn heartbeat(&self, job_id: &str, lock_token: &str, lock_duration_ms: u64) -> Result<()>;

    /// Record a terminal success and release the job's lock.
    async fn complete(&self, job_id: &str, lock_token: &str, result: EvaluationResult) -> Result<()>;

    /// Record a failed attempt and release the job's lock. If attempts remain, the job is
    /// rescheduled after the configured backoff delay; otherwise it becomes terminally failed
    /// (spec.md §4.2 "Backoff policy").
    async fn fail(&self, job_id: &str, lock_token: &str, error: String) -> Result<()>;

    /// Record a failure that skips the backoff/retry policy entirely and moves the job straight
    /// to the terminal failed set, regardless of attempts remaining (spec.md §7 error taxonomy
    /// "Strategy exception | evaluation job fails with reason `strategy-error` | do not retry").
    async fn fail_terminal(&self, job_id: &str, lock_token: &str, error: String) -> Result<()>;

    /// Find jobs whose lock has expired without a heartbeat and redeliver them (or, once
    /// `max_stalled_redeliveries` is exceeded, move them to the terminal failed set). Returns
    /// the ids of jobs acted on. Called periodically by a [`crate::worker::Worker`]'s stalled
    /// check loop.
    async fn reap_stalled(&self, max_stalled_redeliveries: u32) -> Result<Vec<String>>;
}
