//! Single worker attached to one [`Queue`] (spec.md §4.2 "Worker contract"): bounded in-flight
//! concurrency `K`, a periodic stalled check, graceful drain on stop.

use crate::{
    error::Result,
    events::WorkerEvent,
    job::EvaluationResult,
    queue::Queue,
    stats::{StatsTracker, WorkerStats},
};
use chrono::Utc;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, Semaphore};

/// A unit of work this worker knows how to execute: pull the next job's payload off the queue
/// and produce a result. Supplied by the caller (in practice, `conveyor-orchestrator`'s evaluate
/// node) so this crate stays ignorant of backtest internals.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: crate::job::EvaluationJob) -> std::result::Result<(EvaluationResult, usize), String>;
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Max in-flight jobs this worker holds at once (spec.md §4.2 "concurrency K").
    pub concurrency: usize,
    /// Lock duration `L` granted on claim; a job held longer without heartbeat stalls.
    pub lock_duration_ms: u64,
    /// How often the stalled check runs.
    pub stalled_interval_ms: u64,
    pub max_stalled_redeliveries: u32,
    /// How long `stop()` waits for in-flight jobs before abandoning them to stall detection.
    pub drain_deadline_ms: u64,
    /// How often an idle worker polls the queue for new work.
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            lock_duration_ms: 30_000,
            stalled_interval_ms: 5_000,
            max_stalled_redeliveries: 3,
            drain_deadline_ms: 30_000,
            poll_interval_ms: 250,
        }
    }
}

/// Runs a claim loop against a [`Queue`], dispatching claimed jobs to a [`JobHandler`] under a
/// bounded [`Semaphore`], and a parallel stalled-check loop. Stopped gracefully via [`Worker::stop`].
pub struct Worker {
    queue: Arc<dyn Queue>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    stats: Arc<Mutex<StatsTracker>>,
    events: broadcast::Sender<WorkerEvent>,
    stop_flag: Arc<std::sync::atomic::AtomicBool>,
}

impl Worker {
    pub fn new(queue: Arc<dyn Queue>, handler: Arc<dyn JobHandler>, config: WorkerConfig) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            queue,
            handler,
            config,
            stats: Arc::new(Mutex::new(StatsTracker::default())),
            events,
            stop_flag: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().snapshot()
    }

    /// Spawn the claim loop and the stalled-check loop as background tasks. Returns a handle that
    /// joins both on `stop()`.
    pub fn start(self: Arc<Self>) -> WorkerHandle {
        let _ = self.events.send(WorkerEvent::Ready);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));

        let claim_worker = self.clone();
        let claim_semaphore = semaphore.clone();
        let claim_task = tokio::spawn(async move { claim_worker.claim_loop(claim_semaphore).await });

        let stall_worker = self.clone();
        let stall_task = tokio::spawn(async move { stall_worker.stalled_loop().await });

        WorkerHandle { worker: self, semaphore, claim_task, stall_task }
    }

    async fn claim_loop(&self, semaphore: Arc<Semaphore>) {
        loop {
            if self.stop_flag.load(std::sync::atomic::Ordering::SeqCst) {
                return;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            match self.queue.claim(self.config.lock_duration_ms).await {
                Ok(Some(claimed)) => {
                    self.stats.lock().claim();
                    let _ = self.events.send(WorkerEvent::Active {
                        job_id: claimed.job.id.clone(),
                        attempt: claimed.job.attempt,
                    });

                    let queue = self.queue.clone();
                    let handler = self.handler.clone();
                    let stats = self.stats.clone();
                    let events = self.events.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let started = Utc::now();
                        let job_id = claimed.job.id.clone();
                        let attempt = claimed.job.attempt;

                        match handler.handle(claimed.job).await {
                            Ok((result, _bars)) => {
                                let processing_time_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;
                                let now = Utc::now();
                                if let Err(error) = queue.complete(&job_id, &claimed.lock_token, result.clone()).await {
                                    tracing::warn!(job_id, %error, "failed to record job completion");
                                }
                                stats.lock().record_success(processing_time_ms, now);
                                let _ = events.send(WorkerEvent::Completed { job_id, attempt, result });
                            }
                            Err(error) => {
                                let now = Utc::now();
                                // spec.md §7 error taxonomy: a strategy exception is tagged by
                                // the handler and skips the backoff/retry policy entirely.
                                let outcome = if let Some(reason) = error.strip_prefix("strategy-error:") {
                                    queue.fail_terminal(&job_id, &claimed.lock_token, reason.to_string()).await
                                } else {
                                    queue.fail(&job_id, &claimed.lock_token, error.clone()).await
                                };
                                if let Err(queue_error) = outcome {
                                    tracing::warn!(job_id, %queue_error, "failed to record job failure");
                                }
                                stats.lock().record_failure(now);
                                let _ = events.send(WorkerEvent::Failed { job_id, attempt, error });
                            }
                        }
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                }
                Err(error) => {
                    drop(permit);
                    tracing::warn!(%error, "queue claim failed");
                    let _ = self.events.send(WorkerEvent::Error { message: error.to_string() });
                    tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                }
            }
        }
    }

    async fn stalled_loop(&self) {
        loop {
            if self.stop_flag.load(std::sync::atomic::Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(self.config.stalled_interval_ms)).await;
            match self.queue.reap_stalled(self.config.max_stalled_redeliveries).await {
                Ok(redelivered) => {
                    for job_id in redelivered {
                        let _ = self.events.send(WorkerEvent::Stalled { job_id });
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "stalled check failed");
                }
            }
        }
    }
}

/// Handle returned by [`Worker::start`]. Dropping it does not stop the worker; call
/// [`WorkerHandle::stop`] to drain gracefully (spec.md §4.2 "`stop()` is graceful").
pub struct WorkerHandle {
    worker: Arc<Worker>,
    semaphore: Arc<Semaphore>,
    claim_task: tokio::task::JoinHandle<()>,
    stall_task: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop accepting new claims and wait up to `drain_deadline_ms` for in-flight jobs to finish
    /// naturally (observed as all concurrency permits becoming available again). Jobs still
    /// in-flight past the deadline are abandoned to stall detection on next worker start.
    pub async fn stop(self) -> Result<()> {
        self.worker.stop_flag.store(true, std::sync::atomic::Ordering::SeqCst);
        self.claim_task.abort();

        let deadline = Duration::from_millis(self.worker.config.drain_deadline_ms);
        let total_permits = self.worker.config.concurrency;
        let drained = tokio::time::timeout(deadline, async {
            let _ = self.semaphore.acquire_many(total_permits as u32).await;
        })
        .await;

        if drained.is_err() {
            tracing::warn!("worker drain deadline exceeded; in-flight jobs abandoned to stall detection");
        }

        self.stall_task.abort();
        self.worker.queue.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{job::EvaluationJob, memory::InMemoryQueue};
    use conveyor_backtest::{EngineConfig, FillModel};
    use conveyor_instrument::InstrumentIndex;
    use rust_decimal_macros::dec;

    struct AlwaysSucceed;

    #[async_trait::async_trait]
    impl JobHandler for AlwaysSucceed {
        async fn handle(&self, job: EvaluationJob) -> std::result::Result<(EvaluationResult, usize), String> {
            Ok((
                EvaluationResult {
                    job_id: job.id,
                    candidate_id: job.candidate_id,
                    attempt: job.attempt,
                    outcome: crate::job::JobOutcome::Success(dummy_report()),
                    processing_time_ms: 1,
                    bars_processed: 10,
                },
                10,
            ))
        }
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

    #[tokio::test]
    async fn claimed_job_completes_and_updates_stats() {
        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new());
        queue
            .enqueue(
                EvaluationJob {
                    id: "j-1".to_string(),
                    candidate_id: "c-1".to_string(),
                    instrument: InstrumentIndex::new(0),
                    timeframe: "1h".to_string(),
                    window_days: 30,
                    engine_config: EngineConfig::new(dec!(10000), FillModel::Standard, dec!(0.0005), dec!(5), 0, None),
                    priority: 0,
                    attempt: 0,
                    attempt_limit: 3,
                },
                crate::job::EnqueueOptions::default(),
            )
            .await
            .unwrap();

        let worker = Arc::new(Worker::new(queue.clone(), Arc::new(AlwaysSucceed), WorkerConfig::default()));
        let mut events = worker.subscribe();
        let handle = worker.start();

        let mut completed = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            while let Ok(event) = events.try_recv() {
                if matches!(event, WorkerEvent::Completed { .. }) {
                    completed = true;
                }
            }
            if completed {
                break;
            }
        }
        assert!(completed, "expected a completed event within the poll window");

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.completed, 1);

        handle.stop().await.unwrap();
    }
}
