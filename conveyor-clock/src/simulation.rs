use crate::{
    clock::{Clock, ClockCallback, ClockError, Result},
    engine::{self, FiredEvent, ScheduleKind, ScheduledEntry},
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

struct SimulationState {
    current: DateTime<Utc>,
    entries: HashMap<String, ScheduledEntry>,
    next_seq: u64,
}

/// Deterministic clock for backtest replay. Time only moves when explicitly advanced, and every
/// advance fires due timers/alerts synchronously in timestamp order (FIFO tie-break), so replay
/// is byte-identical given the same bar sequence and configuration.
pub struct SimulationClock {
    state: Mutex<SimulationState>,
}

impl SimulationClock {
    /// Construct a clock seeded to `start`, as the backtest engine does with `bars[0].timestamp`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(SimulationState {
                current: start,
                entries: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Advance to an absolute instant, firing every due timer/alert along the way.
    pub fn advance_to(&self, target: DateTime<Utc>) -> Result<Vec<FiredEvent>> {
        let mut state = self.state.lock();
        if target < state.current {
            return Err(ClockError::NonMonotonicAdvance {
                current: state.current,
                requested: target,
            });
        }

        let fired = engine::fire_due(&mut state.entries, target);
        state.current = target;
        Ok(fired)
    }

    /// Advance by a relative, non-negative duration.
    pub fn advance_by(&self, delta: Duration) -> Result<Vec<FiredEvent>> {
        let target = {
            let state = self.state.lock();
            state.current + delta
        };
        self.advance_to(target)
    }

    /// Jump directly to `time` without firing any timers/alerts, for seeding the clock before
    /// replay starts. Unlike `advance_to`/`advance_by` this permits moving backward.
    pub fn set_time(&self, time: DateTime<Utc>) {
        self.state.lock().current = time;
    }
}

impl Clock for SimulationClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().current
    }

    fn set_timer(&self, name: &str, interval: Duration, callback: ClockCallback) {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let next_trigger = state.current + interval;
        state.entries.insert(
            name.to_string(),
            ScheduledEntry {
                next_trigger,
                kind: ScheduleKind::Timer { interval },
                seq,
                callback,
            },
        );
    }

    fn set_alert(&self, name: &str, trigger_time: DateTime<Utc>, callback: ClockCallback) {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            name.to_string(),
            ScheduledEntry {
                next_trigger: trigger_time,
                kind: ScheduleKind::Alert,
                seq,
                callback,
            },
        );
    }

    fn cancel(&self, name: &str) {
        self.state.lock().entries.remove(name);
    }
}
