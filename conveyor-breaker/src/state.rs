use crate::config::BreakerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of a breaker, returned by `getStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub is_open: bool,
    pub failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub(crate) struct BreakerState {
    config: BreakerConfig,
    failures: u32,
    is_open: bool,
    opened_at: Option<DateTime<Utc>>,
}

impl BreakerState {
    pub(crate) fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            failures: 0,
            is_open: false,
            opened_at: None,
        }
    }

    pub(crate) fn should_skip(&self, now: DateTime<Utc>) -> bool {
        match (self.is_open, self.opened_at) {
            (true, Some(opened_at)) => now - opened_at < self.config.reset,
            _ => false,
        }
    }

    pub(crate) fn record_success(&mut self) {
        self.failures = 0;
        self.is_open = false;
        self.opened_at = None;
    }

    /// Returns `true` if this failure just tripped the breaker open.
    pub(crate) fn record_failure(&mut self, now: DateTime<Utc>) -> bool {
        self.failures += 1;
        if !self.is_open && self.failures >= self.config.threshold {
            self.is_open = true;
            self.opened_at = Some(now);
            true
        } else {
            false
        }
    }

    pub(crate) fn force_open(&mut self, now: DateTime<Utc>) {
        self.is_open = true;
        self.opened_at = Some(now);
        self.failures = self.failures.max(self.config.threshold);
    }

    pub(crate) fn reset(&mut self) {
        self.failures = 0;
        self.is_open = false;
        self.opened_at = None;
    }

    pub(crate) fn status(&self) -> BreakerStatus {
        BreakerStatus {
            is_open: self.is_open,
            failures: self.failures,
            opened_at: self.opened_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_closed_below_threshold() {
        let mut state = BreakerState::new(BreakerConfig::new(3, chrono::Duration::seconds(1)));
        let now = Utc::now();
        assert!(!state.record_failure(now));
        assert!(!state.record_failure(now));
        assert!(!state.should_skip(now));
    }

    #[test]
    fn opens_exactly_at_threshold() {
        let mut state = BreakerState::new(BreakerConfig::new(2, chrono::Duration::seconds(1)));
        let now = Utc::now();
        assert!(!state.record_failure(now));
        assert!(state.record_failure(now));
        assert!(state.should_skip(now));
    }
}
