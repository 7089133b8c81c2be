//! Redis-backed [`Queue`] transport (spec.md §4.2 `[ADD]` "Transport"): durable, at-least-once,
//! lock-based semantics mirroring a BullMQ-style job queue. The teacher's own Redis client code
//! (`jackbot-data/src/redis_store.rs`) talks to Redis synchronously per-call; this transport
//! instead holds one `redis::aio::ConnectionManager` (auto-reconnecting, cheaply `Clone`) since
//! the worker pool's claim loop cannot afford to block a Tokio task on a blocking connection.

use crate::{
    error::{QueueError, Result},
    job::{EnqueueOptions, EvaluationJob, EvaluationResult, QueueCounts},
    queue::{ClaimedJob, Queue},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredJob {
    job: EvaluationJob,
    options: EnqueueOptions,
    enqueued_at: DateTime<Utc>,
}

/// Durable queue backed by a Redis connection. Keys are namespaced under `{prefix}:{queueName}`.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisQueue {
    pub async fn connect(url: &str, queue_name: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn, prefix: format!("conveyor:queue:{queue_name}") })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    fn job_key(&self, job_id: &str) -> String {
        self.key(&format!("job:{job_id}"))
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn enqueue(&self, job: EvaluationJob, options: EnqueueOptions) -> Result<String> {
        let mut conn = self.conn.clone();
        let id = options.job_id.clone().unwrap_or_else(|| job.id.clone());

        let job_key = self.job_key(&id);
        let exists: bool = conn.exists(&job_key).await?;
        if exists {
            return Ok(id);
        }

        let mut job = job;
        job.id = id.clone();
        job.priority = options.priority;
        job.attempt_limit = options.attempts;
        let stored = StoredJob { job, options: options.clone(), enqueued_at: Utc::now() };
        let payload = serde_json::to_string(&stored)?;

        redis::pipe()
            .atomic()
            .hset(&job_key, "data", payload)
            .hset(&job_key, "priority", options.priority)
            .hset(&job_key, "state", "waiting")
            .zadd(self.key("waiting"), &id, options.priority)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(id)
    }

    async fn counts(&self) -> Result<QueueCounts> {
        let mut conn = self.conn.clone();
        let waiting: usize = conn.zcard(self.key("waiting")).await?;
        let active: usize = conn.zcard(self.key("active")).await?;
        let completed: usize = conn.llen(self.key("completed")).await?;
        let failed: usize = conn.llen(self.key("failed")).await?;
        let delayed: usize = conn.zcard(self.key("delayed")).await?;
        Ok(QueueCounts { waiting, active, completed, failed, delayed })
    }

    async fn result(&self, job_id: &str) -> Result<Option<EvaluationResult>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(self.key("results"), job_id).await?;
        Ok(match raw {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        })
    }

    async fn pause(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set(self.key("paused"), 1).await?;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del(self.key("paused")).await?;
        Ok(())
    }

    async fn is_paused(&self) -> Result<bool> {
        let mut conn = self.conn.clone();
        let paused: bool = conn.exists(self.key("paused")).await?;
        Ok(paused)
    }

    async fn close(&self) -> Result<()> {
        // `ConnectionManager` has no explicit close; dropping the last clone releases the
        // socket. Nothing to do here beyond honoring the contract's method.
        Ok(())
    }

    async fn claim(&self, lock_duration_ms: u64) -> Result<Option<ClaimedJob>> {
        let mut conn = self.conn.clone();
        if self.is_paused().await? {
            return Ok(None);
        }

        // Promote due delayed jobs into waiting before picking the next candidate.
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = conn.zrangebyscore(self.key("delayed"), 0, now_ms).await?;
        for id in &due {
            let priority: i32 = conn.hget(self.job_key(id), "priority").await.unwrap_or(0);
            redis::pipe()
                .atomic()
                .zrem(self.key("delayed"), id)
                .zadd(self.key("waiting"), id, priority)
                .query_async::<()>(&mut conn)
                .await?;
        }

        // Highest priority (zset score) claimed first, FIFO among equal scores by member
        // insertion order is approximated by Redis's score/member tie-break.
        let candidates: Vec<(String, i32)> = conn.zrevrange_withscores(self.key("waiting"), 0, 0).await?;
        let Some((id, _)) = candidates.into_iter().next() else {
            return Ok(None);
        };

        let removed: i32 = conn.zrem(self.key("waiting"), &id).await?;
        if removed == 0 {
            // Lost a race with another worker's claim; caller retries on the next poll.
            return Ok(None);
        }

        let job_key = self.job_key(&id);
        let data: String = conn.hget(&job_key, "data").await?;
        let mut stored: StoredJob = serde_json::from_str(&data)?;
        stored.job.attempt += 1;
        let lock_token = uuid_like();
        let now = Utc::now();

        redis::pipe()
            .atomic()
            .hset(&job_key, "data", serde_json::to_string(&stored)?)
            .hset(&job_key, "state", "active")
            .hset(&job_key, "lock_token", &lock_token)
            .hset(&job_key, "lock_duration_ms", lock_duration_ms)
            .zadd(self.key("active"), &id, now.timestamp_millis() + lock_duration_ms as i64)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(Some(ClaimedJob { job: stored.job, lock_token, claimed_at: now }))
    }

    async fn heartbeat(&self, job_id: &str, lock_token: &str, lock_duration_ms: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        self.check_owner(&mut conn, job_id, lock_token).await?;
        let expiry = Utc::now().timestamp_millis() + lock_duration_ms as i64;
        redis::pipe()
            .atomic()
            .hset(self.job_key(job_id), "lock_duration_ms", lock_duration_ms)
            .zadd(self.key("active"), job_id, expiry)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn complete(&self, job_id: &str, lock_token: &str, result: EvaluationResult) -> Result<()> {
        let mut conn = self.conn.clone();
        self.check_owner(&mut conn, job_id, lock_token).await?;

        let results_key = self.key("results");
        let already: bool = conn.hexists(&results_key, job_id).await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(self.job_key(job_id), "state", "completed")
            .zrem(self.key("active"), job_id)
            .rpush(self.key("completed"), job_id);
        if !already {
            pipe.hset(results_key, job_id, serde_json::to_string(&result)?);
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn fail(&self, job_id: &str, lock_token: &str, error: String) -> Result<()> {
        let mut conn = self.conn.clone();
        self.check_owner(&mut conn, job_id, lock_token).await?;

        let job_key = self.job_key(job_id);
        let data: String = conn.hget(&job_key, "data").await?;
        let stored: StoredJob = serde_json::from_str(&data)?;
        let exhausted = stored.job.attempt >= stored.options.attempts;

        if exhausted {
            let failure = EvaluationResult {
                job_id: job_id.to_string(),
                candidate_id: stored.job.candidate_id.clone(),
                attempt: stored.job.attempt,
                outcome: crate::job::JobOutcome::Failure(error),
                processing_time_ms: 0,
                bars_processed: 0,
            };
            redis::pipe()
                .atomic()
                .hset(&job_key, "state", "failed")
                .zrem(self.key("active"), job_id)
                .rpush(self.key("failed"), job_id)
                .hset(self.key("results"), job_id, serde_json::to_string(&failure)?)
                .query_async::<()>(&mut conn)
                .await?;
        } else {
            let delay_ms = stored.options.backoff.delay_ms(stored.job.attempt);
            let available_at = Utc::now().timestamp_millis() + delay_ms as i64;
            redis::pipe()
                .atomic()
                .hset(&job_key, "state", "waiting")
                .zrem(self.key("active"), job_id)
                .zadd(self.key("delayed"), job_id, available_at)
                .query_async::<()>(&mut conn)
                .await?;
        }
        Ok(())
    }

    async fn fail_terminal(&self, job_id: &str, lock_token: &str, error: String) -> Result<()> {
        let mut conn = self.conn.clone();
        self.check_owner(&mut conn, job_id, lock_token).await?;

        let job_key = self.job_key(job_id);
        let data: String = conn.hget(&job_key, "data").await?;
        let stored: StoredJob = serde_json::from_str(&data)?;
        let failure = EvaluationResult {
            job_id: job_id.to_string(),
            candidate_id: stored.job.candidate_id,
            attempt: stored.job.attempt,
            outcome: crate::job::JobOutcome::Failure(error),
            processing_time_ms: 0,
            bars_processed: 0,
        };
        redis::pipe()
            .atomic()
            .hset(&job_key, "state", "failed")
            .zrem(self.key("active"), job_id)
            .rpush(self.key("failed"), job_id)
            .hset(self.key("results"), job_id, serde_json::to_string(&failure)?)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn reap_stalled(&self, max_stalled_redeliveries: u32) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let now_ms = Utc::now().timestamp_millis();
        let stalled: Vec<String> = conn.zrangebyscore(self.key("active"), 0, now_ms).await?;

        let mut acted_on = Vec::new();
        for id in stalled {
            let job_key = self.job_key(&id);
            let stalled_count: u32 = conn.hincr(&job_key, "stalled_count", 1).await?;

            if stalled_count > max_stalled_redeliveries {
                let data: String = conn.hget(&job_key, "data").await?;
                let stored: StoredJob = serde_json::from_str(&data)?;
                let failure = EvaluationResult {
                    job_id: id.clone(),
                    candidate_id: stored.job.candidate_id,
                    attempt: stored.job.attempt,
                    outcome: crate::job::JobOutcome::Failure("exceeded max stalled redeliveries".to_string()),
                    processing_time_ms: 0,
                    bars_processed: 0,
                };
                redis::pipe()
                    .atomic()
                    .hset(&job_key, "state", "failed")
                    .zrem(self.key("active"), &id)
                    .rpush(self.key("failed"), &id)
                    .hset(self.key("results"), &id, serde_json::to_string(&failure)?)
                    .query_async::<()>(&mut conn)
                    .await?;
            } else {
                let priority: i32 = conn.hget(&job_key, "priority").await.unwrap_or(0);
                redis::pipe()
                    .atomic()
                    .hset(&job_key, "state", "waiting")
                    .zrem(self.key("active"), &id)
                    .zadd(self.key("waiting"), &id, priority)
                    .query_async::<()>(&mut conn)
                    .await?;
            }
            acted_on.push(id);
        }

        Ok(acted_on)
    }
}

impl RedisQueue {
    async fn check_owner(&self, conn: &mut ConnectionManager, job_id: &str, lock_token: &str) -> Result<()> {
        let stored_token: Option<String> = conn.hget(self.job_key(job_id), "lock_token").await?;
        match stored_token {
            Some(token) if token == lock_token => Ok(()),
            Some(_) => Err(QueueError::NotOwner(job_id.to_string())),
            None => Err(QueueError::JobNotFound(job_id.to_string())),
        }
    }
}

/// Opaque lock token, unique enough for one process's claim traffic without pulling in `uuid`
/// (teacher convention: `format!("order_{}", ...)` ids, see `barter-strategy/src/action.rs`).
fn uuid_like() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("lock-{}-{}", Utc::now().timestamp_nanos_opt().unwrap_or(0), counter)
}
