use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const ROLLING_WINDOW: usize = 100;

/// Point-in-time snapshot of one worker's throughput (spec.md §3 "Worker Statistics").
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
    pub active: u64,
    pub avg_processing_time_ms: f64,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub last_failed_at: Option<DateTime<Utc>>,
}

/// Mutable accumulator behind [`WorkerStats`]: a rolling window of the last 100 processing
/// times feeds the moving average, per spec.md §3.
#[derive(Debug, Default)]
pub(crate) struct StatsTracker {
    processed: u64,
    failed: u64,
    active: u64,
    processing_times: VecDeque<u64>,
    last_processed_at: Option<DateTime<Utc>>,
    last_failed_at: Option<DateTime<Utc>>,
}

impl StatsTracker {
    pub(crate) fn claim(&mut self) {
        self.active += 1;
    }

    pub(crate) fn record_success(&mut self, processing_time_ms: u64, now: DateTime<Utc>) {
        self.active = self.active.saturating_sub(1);
        self.processed += 1;
        self.last_processed_at = Some(now);
        if self.processing_times.len() == ROLLING_WINDOW {
            self.processing_times.pop_front();
        }
        self.processing_times.push_back(processing_time_ms);
    }

    pub(crate) fn record_failure(&mut self, now: DateTime<Utc>) {
        self.active = self.active.saturating_sub(1);
        self.failed += 1;
        self.last_failed_at = Some(now);
    }

    pub(crate) fn snapshot(&self) -> WorkerStats {
        let avg_processing_time_ms = if self.processing_times.is_empty() {
            0.0
        } else {
            self.processing_times.iter().sum::<u64>() as f64 / self.processing_times.len() as f64
        };

        WorkerStats {
            processed: self.processed,
            failed: self.failed,
            active: self.active,
            avg_processing_time_ms,
            last_processed_at: self.last_processed_at,
            last_failed_at: self.last_failed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_window_caps_at_100_samples() {
        let mut tracker = StatsTracker::default();
        let now = Utc::now();
        for i in 0..150u64 {
            tracker.claim();
            tracker.record_success(i, now);
        }
        assert_eq!(tracker.processing_times.len(), ROLLING_WINDOW);
        assert_eq!(tracker.snapshot().processed, 150);
    }

    #[test]
    fn failure_increments_failed_and_decrements_active() {
        let mut tracker = StatsTracker::default();
        tracker.claim();
        tracker.record_failure(Utc::now());
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.active, 0);
    }
}
