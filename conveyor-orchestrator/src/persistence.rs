//! Key-value persistence abstraction (spec.md §6 "Persistence (conceptual, schema not
//! mandated)"): `backtest_results` upsert by job id, `strategies` upsert by candidate id, and the
//! per-UTC-day rebalance counter bucket the safety gate's daily cap reads (spec.md §4.3 `[ADD]`
//! "Daily-rebalance counting persistence").

use async_trait::async_trait;
use conveyor_queue::EvaluationResult;
use conveyor_strategy::CandidateIdea;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of the conceptual `strategies` table: a candidate's latest lifecycle snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySnapshot {
    pub candidate: CandidateIdea,
    pub last_result: Option<EvaluationResult>,
    pub active: bool,
}

/// The orchestrator's persistence boundary. Implementations own the actual store (a KV database,
/// a SQL table, a file); the core only needs upsert-by-key semantics and a day-bucketed counter.
#[async_trait]
pub trait CyclePersistence: Send + Sync {
    /// Upsert by `result.job_id` (spec.md §6 "results upsert by `jobId`").
    async fn upsert_backtest_result(&self, result: &EvaluationResult) -> Result<(), String>;

    /// Upsert by `snapshot.candidate.id` (spec.md §6 "strategies upsert by `strategyId`").
    async fn upsert_strategy(&self, snapshot: &StrategySnapshot) -> Result<(), String>;

    /// Current rebalance count for the UTC day bucket `day` (`YYYY-MM-DD`).
    async fn daily_rebalance_count(&self, day: &str) -> Result<u32, String>;

    /// Increment and return the new count for `day`. The bucket resets implicitly: a `day` value
    /// never seen before starts at 0, so the orchestrator never needs to reset a counter
    /// explicitly when the UTC date rolls over.
    async fn increment_daily_rebalance(&self, day: &str) -> Result<u32, String>;
}

/// In-process implementation backing unit/integration tests and any deployment that doesn't need
/// persistence across restarts, mirroring [`conveyor_queue::memory::InMemoryQueue`]'s
/// single-mutex convention.
#[derive(Default)]
pub struct InMemoryPersistence {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    backtest_results: HashMap<String, EvaluationResult>,
    strategies: HashMap<String, StrategySnapshot>,
    daily_rebalances: HashMap<String, u32>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strategy(&self, candidate_id: &str) -> Option<StrategySnapshot> {
        self.inner.lock().strategies.get(candidate_id).cloned()
    }

    pub fn backtest_result(&self, job_id: &str) -> Option<EvaluationResult> {
        self.inner.lock().backtest_results.get(job_id).cloned()
    }
}

#[async_trait]
impl CyclePersistence for InMemoryPersistence {
    async fn upsert_backtest_result(&self, result: &EvaluationResult) -> Result<(), String> {
        self.inner.lock().backtest_results.insert(result.job_id.clone(), result.clone());
        Ok(())
    }

    async fn upsert_strategy(&self, snapshot: &StrategySnapshot) -> Result<(), String> {
        self.inner.lock().strategies.insert(snapshot.candidate.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn daily_rebalance_count(&self, day: &str) -> Result<u32, String> {
        Ok(self.inner.lock().daily_rebalances.get(day).copied().unwrap_or(0))
    }

    async fn increment_daily_rebalance(&self, day: &str) -> Result<u32, String> {
        let mut inner = self.inner.lock();
        let count = inner.daily_rebalances.entry(day.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn daily_rebalance_bucket_starts_at_zero_and_increments() {
        let store = InMemoryPersistence::new();
        assert_eq!(store.daily_rebalance_count("2026-07-28").await.unwrap(), 0);
        assert_eq!(store.increment_daily_rebalance("2026-07-28").await.unwrap(), 1);
        assert_eq!(store.increment_daily_rebalance("2026-07-28").await.unwrap(), 2);
        // A new day bucket starts fresh without any explicit reset.
        assert_eq!(store.daily_rebalance_count("2026-07-29").await.unwrap(), 0);
    }
}
