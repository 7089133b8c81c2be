use conveyor_backtest::{classify, EngineConfig, FillModel, PerformanceReport};
use conveyor_instrument::InstrumentIndex;
use conveyor_queue::{
    EnqueueOptions, EvaluationJob, EvaluationResult, InMemoryQueue, JobHandler, JobOutcome, PoolConfig, PoolSupervisor,
    Queue, WorkerConfig,
};
use rust_decimal_macros::dec;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

fn dummy_report() -> PerformanceReport {
    PerformanceReport {
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
        verdict: classify(1.5, dec!(60), dec!(0.05), dec!(1.4), 12, Default::default()),
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

/// S3 — Stall redelivery: a handler that hangs forever on attempt 1 (simulating a worker that
/// dies mid-job without publishing) and completes instantly on attempt 2. With two workers
/// sharing one queue, the first worker's sole concurrency permit is permanently consumed by the
/// hung attempt (modelling that worker's death); the second worker claims the job once stall
/// detection requeues it, and exactly one `completed` result is recorded for the job id.
struct HangsOnceThenSucceeds {
    attempts_seen: AtomicU32,
}

#[async_trait::async_trait]
impl JobHandler for HangsOnceThenSucceeds {
    async fn handle(&self, job: EvaluationJob) -> Result<(EvaluationResult, usize), String> {
        let seen = self.attempts_seen.fetch_add(1, Ordering::SeqCst);
        if seen == 0 {
            // Never returns; the claiming worker's permit is abandoned until stall detection
            // redelivers the job to a second claim.
            std::future::pending::<()>().await;
        }
        Ok((
            EvaluationResult {
                job_id: job.id,
                candidate_id: job.candidate_id,
                attempt: job.attempt,
                outcome: JobOutcome::Success(dummy_report()),
                processing_time_ms: 5,
                bars_processed: 10,
            },
            10,
        ))
    }
}

#[tokio::test]
async fn stall_redelivery_completes_exactly_once_via_pool() {
    let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new());
    let handler = Arc::new(HangsOnceThenSucceeds { attempts_seen: AtomicU32::new(0) });

    let pool_config = PoolConfig {
        worker_count: 2,
        worker: WorkerConfig {
            concurrency: 1,
            lock_duration_ms: 200,
            stalled_interval_ms: 100,
            max_stalled_redeliveries: 3,
            drain_deadline_ms: 500,
            poll_interval_ms: 20,
        },
    };
    let pool = PoolSupervisor::new(queue.clone(), handler, pool_config);
    pool.start().await.unwrap();

    pool.add_job(job("stalls-once"), EnqueueOptions::default()).await.unwrap();

    let mut completed_once = false;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let counts = queue.counts().await.unwrap();
        if counts.completed == 1 {
            completed_once = true;
            break;
        }
    }
    assert!(completed_once, "job should complete after stall redelivery");

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 0);

    pool.stop().await.unwrap();
}

/// S6-adjacent: `stop()` pauses new claims immediately; a subsequent `add_job` is accepted (the
/// queue itself isn't closed until after drain) but no worker remains to claim it.
#[tokio::test]
async fn stop_pauses_claims_and_leaves_pending_work_unclaimed() {
    let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new());
    struct Never;
    #[async_trait::async_trait]
    impl JobHandler for Never {
        async fn handle(&self, _job: EvaluationJob) -> Result<(EvaluationResult, usize), String> {
            std::future::pending().await
        }
    }

    let pool = PoolSupervisor::new(queue.clone(), Arc::new(Never), PoolConfig::default());
    pool.start().await.unwrap();
    pool.stop().await.unwrap();

    assert!(!pool.is_running());
    assert!(queue.is_paused().await.unwrap());
}
