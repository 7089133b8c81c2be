//! Pool supervisor (spec.md §4.2 "Pool supervisor contract"): owns N workers over one queue,
//! aggregates their statistics, and exposes the lifecycle operations a binary entry point wires
//! to SIGTERM/SIGINT.

use crate::{
    error::Result,
    job::{EnqueueOptions, EvaluationJob, QueueCounts},
    queue::Queue,
    stats::WorkerStats,
    worker::{JobHandler, Worker, WorkerConfig, WorkerHandle},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{atomic::{AtomicBool, Ordering}, Arc};

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub worker: WorkerConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { worker_count: 2, worker: WorkerConfig::default() }
    }
}

/// Aggregated view exposed by [`PoolSupervisor::stats`] (spec.md §4.2 "`stats()` (aggregated
/// worker stats + queue counts + uptime + rolling avg processing time)").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolStats {
    pub worker_count: usize,
    pub processed: u64,
    pub failed: u64,
    pub active: u64,
    pub avg_processing_time_ms: f64,
    pub queue: QueueCounts,
    pub uptime_secs: i64,
}

/// Owns N [`Worker`]s attached to the same [`Queue`]. Not `Clone`; share via `Arc`.
pub struct PoolSupervisor {
    queue: Arc<dyn Queue>,
    handler: Arc<dyn JobHandler>,
    config: PoolConfig,
    started_at: parking_lot::Mutex<Option<DateTime<Utc>>>,
    workers: parking_lot::Mutex<Vec<(Arc<Worker>, Option<WorkerHandle>)>>,
    running: AtomicBool,
}

impl PoolSupervisor {
    pub fn new(queue: Arc<dyn Queue>, handler: Arc<dyn JobHandler>, config: PoolConfig) -> Self {
        Self {
            queue,
            handler,
            config,
            started_at: parking_lot::Mutex::new(None),
            workers: parking_lot::Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn `worker_count` workers, each claiming from the shared queue.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.queue.resume().await?;

        let mut workers = self.workers.lock();
        for _ in 0..self.config.worker_count {
            let worker = Arc::new(Worker::new(self.queue.clone(), self.handler.clone(), self.config.worker));
            let handle = worker.clone().start();
            workers.push((worker, Some(handle)));
        }
        drop(workers);

        *self.started_at.lock() = Some(Utc::now());
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(worker_count = self.config.worker_count, "pool started");
        Ok(())
    }

    /// Graceful stop: no new claims are accepted across all workers, in-flight jobs drain up to
    /// each worker's deadline, then the queue connection is closed (spec.md §4.2 "`stop()` is
    /// graceful ... the queue connection is closed last").
    pub async fn stop(&self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.running.store(false, Ordering::SeqCst);
        self.queue.pause().await?;

        let handles: Vec<WorkerHandle> = {
            let mut workers = self.workers.lock();
            workers.iter_mut().filter_map(|(_, handle)| handle.take()).collect()
        };
        for handle in handles {
            handle.stop().await?;
        }
        self.workers.lock().clear();

        tracing::info!("pool stopped");
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.queue.pause().await
    }

    pub async fn resume(&self) -> Result<()> {
        self.queue.resume().await
    }

    pub async fn add_job(&self, job: EvaluationJob, options: EnqueueOptions) -> Result<String> {
        self.queue.enqueue(job, options).await
    }

    pub async fn add_batch(&self, jobs: Vec<(EvaluationJob, EnqueueOptions)>) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(jobs.len());
        for (job, options) in jobs {
            ids.push(self.queue.enqueue(job, options).await?);
        }
        Ok(ids)
    }

    pub async fn stats(&self) -> Result<PoolStats> {
        let queue = self.queue.counts().await?;
        let workers = self.workers.lock();

        let mut processed = 0u64;
        let mut failed = 0u64;
        let mut active = 0u64;
        let mut weighted_avg_sum = 0.0;

        for (worker, _) in workers.iter() {
            let snapshot: WorkerStats = worker.stats();
            processed += snapshot.processed;
            failed += snapshot.failed;
            active += snapshot.active;
            weighted_avg_sum += snapshot.avg_processing_time_ms * snapshot.processed as f64;
        }

        let avg_processing_time_ms = if processed == 0 { 0.0 } else { weighted_avg_sum / processed as f64 };
        let uptime_secs = self.started_at.lock().map(|started| (Utc::now() - started).num_seconds()).unwrap_or(0);

        Ok(PoolStats {
            worker_count: workers.len(),
            processed,
            failed,
            active,
            avg_processing_time_ms,
            queue,
            uptime_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{job::JobOutcome, memory::InMemoryQueue, job::EvaluationResult};
    use conveyor_backtest::{EngineConfig, FillModel};
    use conveyor_instrument::InstrumentIndex;
    use rust_decimal_macros::dec;

    struct Instant;

    #[async_trait::async_trait]
    impl JobHandler for Instant {
        async fn handle(&self, job: EvaluationJob) -> std::result::Result<(EvaluationResult, usize), String> {
            Ok((
                EvaluationResult {
                    job_id: job.id,
                    candidate_id: job.candidate_id,
                    attempt: job.attempt,
                    outcome: JobOutcome::Success(dummy_report()),
                    processing_time_ms: 1,
                    bars_processed: 5,
                },
                5,
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
    async fn pool_drains_jobs_then_reports_stats_and_stops_cleanly() {
        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new());
        let pool = PoolSupervisor::new(queue.clone(), Arc::new(Instant), PoolConfig { worker_count: 2, ..Default::default() });

        pool.start().await.unwrap();
        assert!(pool.is_running());

        pool.add_batch(vec![(job("a"), EnqueueOptions::default()), (job("b"), EnqueueOptions::default())])
            .await
            .unwrap();

        let mut completed = 0;
        for _ in 0..40 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            completed = pool.stats().await.unwrap().processed;
            if completed == 2 {
                break;
            }
        }
        assert_eq!(completed, 2);

        pool.stop().await.unwrap();
        assert!(!pool.is_running());
    }
}
