//! Durable job queue, worker pool, backoff, and stall detection (spec.md §4.2 "Distributed
//! Evaluation Worker Pool"). [`memory::InMemoryQueue`] and [`redis_queue::RedisQueue`] both
//! implement the [`Queue`] trait; everything above that line (worker, pool supervisor, stats,
//! events) is transport-agnostic.

pub mod error;
pub mod events;
pub mod job;
pub mod memory;
pub mod pool;
pub mod queue;
pub mod redis_queue;
pub mod stats;
pub mod worker;

pub use error::{QueueError, Result};
pub use events::{publish_evaluation_result, publish_lifecycle, EventBus, LifecycleEvent, NoopEventBus, RecordingEventBus, WorkerEvent};
pub use job::{BackoffPolicy, EnqueueOptions, EvaluationJob, EvaluationResult, JobOutcome, QueueCounts, RetentionPolicy};
pub use memory::InMemoryQueue;
pub use pool::{PoolConfig, PoolStats, PoolSupervisor};
pub use queue::{ClaimedJob, Queue};
pub use redis_queue::RedisQueue;
pub use stats::WorkerStats;
pub use worker::{JobHandler, Worker, WorkerConfig, WorkerHandle};
