//! In-memory [`Queue`] implementation. No external dependency; backs every unit and
//! integration test in this crate, including the stall/backoff/ordering properties of spec.md
//! §8, and is a drop-in substitute for [`crate::redis_queue::RedisQueue`] in deployments that
//! don't need durability across restarts.

use crate::{
    error::{QueueError, Result},
    events::{EventBus, WorkerEvent},
    job::{EnqueueOptions, EvaluationJob, EvaluationResult, JobOutcome, QueueCounts, QueuedJob},
    queue::{ClaimedJob, Queue},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

struct JobRecord {
    queued: QueuedJob,
    state: JobState,
    lock_token: Option<String>,
    locked_at: Option<DateTime<Utc>>,
    lock_duration_ms: u64,
    stalled_count: u32,
}

struct Inner {
    jobs: HashMap<String, JobRecord>,
    /// FIFO order within a priority tier is the insertion order of this vec.
    waiting_order: Vec<String>,
    completed_ids: Vec<(String, DateTime<Utc>)>,
    failed_ids: Vec<(String, DateTime<Utc>)>,
    results: HashMap<String, EvaluationResult>,
    paused: bool,
    closed: bool,
}

/// An in-memory, single-process [`Queue`]. State is guarded by one [`parking_lot::Mutex`],
/// following the teacher's shared-state convention used throughout `jackbot-risk` and
/// `conveyor-breaker`.
pub struct InMemoryQueue {
    inner: Mutex<Inner>,
    events: broadcast::Sender<WorkerEvent>,
    now: fn() -> DateTime<Utc>,
    next_token: Mutex<u64>,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            inner: Mutex::new(Inner {
                jobs: HashMap::new(),
                waiting_order: Vec::new(),
                completed_ids: Vec::new(),
                failed_ids: Vec::new(),
                results: HashMap::new(),
                paused: false,
                closed: false,
            }),
            events,
            now: Utc::now,
            next_token: Mutex::new(0),
        }
    }

    /// Override the time source for deterministic stall/backoff tests.
    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// The first accepted `(jobId, attempt)` result for a given job id; later duplicates from a
    /// stalled-then-redelivered attempt are discarded (spec.md §4.2 "At-least-once guarantees").
    pub fn result_for(&self, job_id: &str) -> Option<EvaluationResult> {
        self.inner.lock().results.get(job_id).cloned()
    }

    fn next_lock_token(&self) -> String {
        let mut counter = self.next_token.lock();
        *counter += 1;
        format!("lock-{}", *counter)
    }

    fn emit(&self, event: WorkerEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(&self, job: EvaluationJob, options: EnqueueOptions) -> Result<String> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }

        let id = options.job_id.clone().unwrap_or_else(|| job.id.clone());
        if let Some(existing) = inner.jobs.get(&id) {
            if existing.state != JobState::Completed && existing.state != JobState::Failed {
                return Ok(id);
            }
        }

        let now = (self.now)();
        let mut job = job;
        job.id = id.clone();
        job.priority = options.priority;
        job.attempt_limit = options.attempts;
        inner.jobs.insert(
            id.clone(),
            JobRecord {
                queued: QueuedJob { job, options, enqueued_at: now, available_at: now },
                state: JobState::Waiting,
                lock_token: None,
                locked_at: None,
                lock_duration_ms: 0,
                stalled_count: 0,
            },
        );
        inner.waiting_order.push(id.clone());
        Ok(id)
    }

    async fn counts(&self) -> Result<QueueCounts> {
        let inner = self.inner.lock();
        let now = (self.now)();
        let mut counts = QueueCounts::default();
        for record in inner.jobs.values() {
            match record.state {
                JobState::Active => counts.active += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Waiting if record.queued.available_at > now => counts.delayed += 1,
                JobState::Waiting => counts.waiting += 1,
            }
        }
        Ok(counts)
    }

    async fn result(&self, job_id: &str) -> Result<Option<EvaluationResult>> {
        Ok(self.inner.lock().results.get(job_id).cloned())
    }

    async fn pause(&self) -> Result<()> {
        self.inner.lock().paused = true;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.inner.lock().paused = false;
        Ok(())
    }

    async fn is_paused(&self) -> Result<bool> {
        Ok(self.inner.lock().paused)
    }

    async fn close(&self) -> Result<()> {
        self.inner.lock().closed = true;
        Ok(())
    }

    async fn claim(&self, lock_duration_ms: u64) -> Result<Option<ClaimedJob>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }
        if inner.paused {
            return Ok(None);
        }

        let now = (self.now)();
        let candidate_id = inner
            .waiting_order
            .iter()
            .filter(|id| {
                inner
                    .jobs
                    .get(*id)
                    .is_some_and(|record| record.state == JobState::Waiting && record.queued.available_at <= now)
            })
            .max_by_key(|id| inner.jobs.get(*id).map(|record| record.queued.job.priority).unwrap_or(i32::MIN))
            .cloned();

        let Some(id) = candidate_id else {
            return Ok(None);
        };

        inner.waiting_order.retain(|existing| existing != &id);
        let lock_token = self.next_lock_token();
        let record = inner.jobs.get_mut(&id).expect("candidate id just observed in map");
        record.state = JobState::Active;
        record.lock_token = Some(lock_token.clone());
        record.locked_at = Some(now);
        record.lock_duration_ms = lock_duration_ms;
        record.queued.job.attempt += 1;

        let claimed = ClaimedJob { job: record.queued.job.clone(), lock_token, claimed_at: now };
        drop(inner);
        self.emit(WorkerEvent::Active { job_id: claimed.job.id.clone(), attempt: claimed.job.attempt });
        Ok(Some(claimed))
    }

    async fn heartbeat(&self, job_id: &str, lock_token: &str, lock_duration_ms: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner.jobs.get_mut(job_id).ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        if record.state != JobState::Active || record.lock_token.as_deref() != Some(lock_token) {
            return Err(QueueError::NotOwner(job_id.to_string()));
        }
        record.locked_at = Some((self.now)());
        record.lock_duration_ms = lock_duration_ms;
        Ok(())
    }

    async fn complete(&self, job_id: &str, lock_token: &str, result: EvaluationResult) -> Result<()> {
        let now = (self.now)();
        {
            let mut inner = self.inner.lock();
            let record = inner.jobs.get_mut(job_id).ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
            if record.state != JobState::Active || record.lock_token.as_deref() != Some(lock_token) {
                return Err(QueueError::NotOwner(job_id.to_string()));
            }
            record.state = JobState::Completed;
            record.lock_token = None;
            record.locked_at = None;

            // First success for a job id wins; later duplicate completions from a stalled
            // redelivery are accepted (no error) but do not overwrite the recorded result.
            inner.results.entry(job_id.to_string()).or_insert_with(|| result.clone());
            inner.completed_ids.push((job_id.to_string(), now));
            prune_retention(&mut inner.completed_ids, record.queued.options.retain_completed.count, record.queued.options.retain_completed.age_secs, now);
        }
        let attempt = result.attempt;
        self.emit(WorkerEvent::Completed { job_id: job_id.to_string(), attempt, result });
        Ok(())
    }

    async fn fail(&self, job_id: &str, lock_token: &str, error: String) -> Result<()> {
        let now = (self.now)();
        let (attempt, exhausted, delay_ms) = {
            let mut inner = self.inner.lock();
            let record = inner.jobs.get_mut(job_id).ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
            if record.state != JobState::Active || record.lock_token.as_deref() != Some(lock_token) {
                return Err(QueueError::NotOwner(job_id.to_string()));
            }
            record.lock_token = None;
            record.locked_at = None;

            let attempt = record.queued.job.attempt;
            let exhausted = attempt >= record.queued.options.attempts;
            let delay_ms = record.queued.options.backoff.delay_ms(attempt);

            if exhausted {
                record.state = JobState::Failed;
                inner.results.entry(job_id.to_string()).or_insert_with(|| EvaluationResult {
                    job_id: job_id.to_string(),
                    candidate_id: record.queued.job.candidate_id.clone(),
                    attempt,
                    outcome: JobOutcome::Failure(error.clone()),
                    processing_time_ms: 0,
                    bars_processed: 0,
                });
                inner.failed_ids.push((job_id.to_string(), now));
                let retain = record.queued.options.retain_failed;
                prune_retention(&mut inner.failed_ids, retain.count, retain.age_secs, now);
            } else {
                record.state = JobState::Waiting;
                record.queued.available_at = now + ChronoDuration::milliseconds(delay_ms as i64);
                inner.waiting_order.push(job_id.to_string());
            }

            (attempt, exhausted, delay_ms)
        };

        self.emit(WorkerEvent::Failed { job_id: job_id.to_string(), attempt, error });
        if !exhausted {
            tracing::debug!(job_id, attempt, delay_ms, "job rescheduled after backoff");
        }
        Ok(())
    }

    async fn fail_terminal(&self, job_id: &str, lock_token: &str, error: String) -> Result<()> {
        let now = (self.now)();
        let attempt = {
            let mut inner = self.inner.lock();
            let record = inner.jobs.get_mut(job_id).ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
            if record.state != JobState::Active || record.lock_token.as_deref() != Some(lock_token) {
                return Err(QueueError::NotOwner(job_id.to_string()));
            }
            record.lock_token = None;
            record.locked_at = None;
            record.state = JobState::Failed;

            let attempt = record.queued.job.attempt;
            inner.results.entry(job_id.to_string()).or_insert_with(|| EvaluationResult {
                job_id: job_id.to_string(),
                candidate_id: record.queued.job.candidate_id.clone(),
                attempt,
                outcome: JobOutcome::Failure(error.clone()),
                processing_time_ms: 0,
                bars_processed: 0,
            });
            inner.failed_ids.push((job_id.to_string(), now));
            let retain = record.queued.options.retain_failed;
            prune_retention(&mut inner.failed_ids, retain.count, retain.age_secs, now);
            attempt
        };

        self.emit(WorkerEvent::Failed { job_id: job_id.to_string(), attempt, error });
        Ok(())
    }

    async fn reap_stalled(&self, max_stalled_redeliveries: u32) -> Result<Vec<String>> {
        let now = (self.now)();
        let mut acted_on = Vec::new();
        let mut inner = self.inner.lock();

        let stalled_ids: Vec<String> = inner
            .jobs
            .iter()
            .filter(|(_, record)| {
                record.state == JobState::Active
                    && record
                        .locked_at
                        .is_some_and(|locked_at| now - locked_at >= ChronoDuration::milliseconds(record.lock_duration_ms as i64))
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in stalled_ids {
            let record = inner.jobs.get_mut(&id).expect("id just observed in map");
            record.stalled_count += 1;
            record.lock_token = None;
            record.locked_at = None;

            if record.stalled_count > max_stalled_redeliveries {
                record.state = JobState::Failed;
                let attempt = record.queued.job.attempt;
                inner.results.entry(id.clone()).or_insert_with(|| EvaluationResult {
                    job_id: id.clone(),
                    candidate_id: record.queued.job.candidate_id.clone(),
                    attempt,
                    outcome: JobOutcome::Failure("exceeded max stalled redeliveries".to_string()),
                    processing_time_ms: 0,
                    bars_processed: 0,
                });
                inner.failed_ids.push((id.clone(), now));
            } else {
                record.state = JobState::Waiting;
                inner.waiting_order.push(id.clone());
            }
            acted_on.push(id);
        }

        drop(inner);
        for id in &acted_on {
            self.emit(WorkerEvent::Stalled { job_id: id.clone() });
        }
        Ok(acted_on)
    }
}

fn prune_retention(ids: &mut Vec<(String, DateTime<Utc>)>, count: usize, age_secs: i64, now: DateTime<Utc>) {
    ids.retain(|(_, at)| (now - *at).num_seconds() <= age_secs);
    if ids.len() > count {
        let excess = ids.len() - count;
        ids.drain(0..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_backtest::{EngineConfig, FillModel};
    use conveyor_instrument::InstrumentIndex;
    use rust_decimal_macros::dec;

    fn job(id: &str) -> EvaluationJob {
        EvaluationJob {
            id: id.to_string(),
            candidate_id: "c-1".to_string(),
            instrument: InstrumentIndex::new(0),
            timeframe: "1h".to_string(),
            window_days: 30,
            engine_config: EngineConfig::new(dec!(10000), FillModel::Standard, dec!(0.0005), dec!(5), 0, None),
            priority: 0,
            attempt: 0,
            attempt_limit: 3,
        }
    }

    #[tokio::test]
    async fn claim_then_complete_records_result_keyed_by_job_id() {
        let queue = InMemoryQueue::new();
        queue.enqueue(job("j-1"), EnqueueOptions::default()).await.unwrap();

        let claimed = queue.claim(5_000).await.unwrap().unwrap();
        assert_eq!(claimed.job.attempt, 1);

        let result = EvaluationResult {
            job_id: "j-1".to_string(),
            candidate_id: "c-1".to_string(),
            attempt: 1,
            outcome: JobOutcome::Success(dummy_report()),
            processing_time_ms: 10,
            bars_processed: 100,
        };
        queue.complete("j-1", &claimed.lock_token, result).await.unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.completed, 1);
        assert!(queue.result_for("j-1").unwrap().is_success());
    }

    #[tokio::test]
    async fn higher_priority_claimed_first() {
        let queue = InMemoryQueue::new();
        queue.enqueue(job("low"), EnqueueOptions { priority: 0, ..Default::default() }).await.unwrap();
        queue.enqueue(job("high"), EnqueueOptions { priority: 10, ..Default::default() }).await.unwrap();

        let claimed = queue.claim(5_000).await.unwrap().unwrap();
        assert_eq!(claimed.job.id, "high");
    }

    #[tokio::test]
    async fn exhausted_attempts_become_terminally_failed_without_retry() {
        let queue = InMemoryQueue::new();
        queue
            .enqueue(job("j-1"), EnqueueOptions { attempts: 1, ..Default::default() })
            .await
            .unwrap();

        let claimed = queue.claim(5_000).await.unwrap().unwrap();
        queue.fail("j-1", &claimed.lock_token, "strategy-error".to_string()).await.unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.waiting, 0);
        assert!(!queue.result_for("j-1").unwrap().is_success());
    }

    #[tokio::test]
    async fn stall_redelivers_within_lock_duration_and_deduplicates_completion() {
        let queue = InMemoryQueue::new();
        queue.enqueue(job("j-1"), EnqueueOptions::default()).await.unwrap();

        let first = queue.claim(1).await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let redelivered = queue.reap_stalled(3).await.unwrap();
        assert_eq!(redelivered, vec!["j-1".to_string()]);

        let second = queue.claim(5_000).await.unwrap().unwrap();
        assert_ne!(first.lock_token, second.lock_token);
        assert_eq!(second.job.attempt, 2);

        queue
            .complete("j-1", &second.lock_token, EvaluationResult {
                job_id: "j-1".to_string(),
                candidate_id: "c-1".to_string(),
                attempt: 2,
                outcome: JobOutcome::Success(dummy_report()),
                processing_time_ms: 5,
                bars_processed: 10,
            })
            .await
            .unwrap();

        // The stale first lock_token can no longer complete the job.
        let stale_complete = queue
            .complete("j-1", &first.lock_token, EvaluationResult {
                job_id: "j-1".to_string(),
                candidate_id: "c-1".to_string(),
                attempt: 1,
                outcome: JobOutcome::Success(dummy_report()),
                processing_time_ms: 5,
                bars_processed: 10,
            })
            .await;
        assert!(stale_complete.is_err());

        assert_eq!(queue.result_for("j-1").unwrap().attempt, 2);
    }

    fn dummy_report() -> conveyor_backtest::PerformanceReport {
        conveyor_backtest::PerformanceReport {
            initial_capital: dec!(10000),
            final_capital: dec!(11000),
            total_return: dec!(0.1),
            annualized_return: dec!(0.1),
            max_drawdown: dec!(0.05),
            sharpe_ratio: 1.5,
            win_rate: dec!(60),
            trade_count: 12,
            profit_factor: dec!(1.4),
            calmar_ratio: dec!(2.0),
            sortino_ratio: 1.8,
            avg_win: dec!(100),
            avg_loss: dec!(-50),
            expectancy: dec!(20),
            risk_adjusted_return: dec!(2.0),
            consistency_score: dec!(0.7),
            trades: Vec::new(),
            warnings: Vec::new(),
            verdict: conveyor_backtest::classify(1.5, dec!(60), dec!(0.05), dec!(1.4), 12, Default::default()),
        }
    }
}
