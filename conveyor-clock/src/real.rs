use crate::{
    clock::{Clock, ClockCallback},
    engine::{self, ScheduleKind, ScheduledEntry},
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration};

const POLL_INTERVAL: StdDuration = StdDuration::from_millis(100);

struct RealClockInner {
    entries: Mutex<HashMap<String, ScheduledEntry>>,
    next_seq: Mutex<u64>,
}

/// Wall-clock implementation of [`Clock`]. Timers and alerts fire from a background polling
/// loop running at 10 Hz (the contract's minimum), started by [`RealClock::spawn`].
#[derive(Clone)]
pub struct RealClock {
    inner: Arc<RealClockInner>,
}

impl Default for RealClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RealClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RealClockInner {
                entries: Mutex::new(HashMap::new()),
                next_seq: Mutex::new(0),
            }),
        }
    }

    /// Start the background polling loop. Runs until cancelled; callers typically hold the
    /// returned handle and abort it as part of graceful shutdown.
    pub fn spawn(&self) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                let now = Utc::now();
                let fired = {
                    let mut entries = inner.entries.lock();
                    engine::fire_due(&mut entries, now)
                };
                for event in fired {
                    tracing::trace!(name = %event.name, ?event.kind, "clock fired");
                }
            }
        })
    }

    fn next_seq(&self) -> u64 {
        let mut seq = self.inner.next_seq.lock();
        let value = *seq;
        *seq += 1;
        value
    }
}

impl Clock for RealClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn set_timer(&self, name: &str, interval: Duration, callback: ClockCallback) {
        let seq = self.next_seq();
        self.inner.entries.lock().insert(
            name.to_string(),
            ScheduledEntry {
                next_trigger: Utc::now() + interval,
                kind: ScheduleKind::Timer { interval },
                seq,
                callback,
            },
        );
    }

    fn set_alert(&self, name: &str, trigger_time: DateTime<Utc>, callback: ClockCallback) {
        let seq = self.next_seq();
        self.inner.entries.lock().insert(
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
        self.inner.entries.lock().remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn alert_fires_via_polling_loop() {
        let clock = RealClock::new();
        let handle = clock.spawn();

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        clock.set_alert(
            "soon",
            Utc::now() + Duration::milliseconds(150),
            Box::new(move || fired_clone.store(true, Ordering::SeqCst)),
        );

        tokio::time::sleep(StdDuration::from_millis(400)).await;
        assert!(fired.load(Ordering::SeqCst));
        handle.abort();
    }

    #[tokio::test]
    async fn cancel_stops_pending_alert() {
        let clock = RealClock::new();
        let handle = clock.spawn();

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        clock.set_alert(
            "soon",
            Utc::now() + Duration::milliseconds(150),
            Box::new(move || fired_clone.store(true, Ordering::SeqCst)),
        );
        clock.cancel("soon");

        tokio::time::sleep(StdDuration::from_millis(400)).await;
        assert!(!fired.load(Ordering::SeqCst));
        handle.abort();
    }
}
