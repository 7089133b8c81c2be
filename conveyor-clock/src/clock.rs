use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

pub use crate::engine::{FiredEvent, FiredKind};

/// Crate-local `Result` alias.
pub type Result<T> = std::result::Result<T, ClockError>;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("cannot advance clock backward: current {current}, requested {requested}")]
    NonMonotonicAdvance {
        current: DateTime<Utc>,
        requested: DateTime<Utc>,
    },
    #[error("no timer or alert registered with name '{0}'")]
    Unknown(String),
}

/// Callback invoked synchronously when a timer or alert fires.
pub type ClockCallback = Box<dyn FnMut() + Send>;

/// Shared interface between the real-time clock and the deterministic simulation clock.
///
/// `now`/`now_ms`/`utc_now` all return the same instant under this implementation — the
/// distinction is kept because the pipeline's configuration and logging surfaces refer to them
/// separately (millisecond epoch for wire payloads, `DateTime<Utc>` everywhere else).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.now()
    }

    /// Register a repeating timer firing every `interval`, first firing at `now() + interval`.
    /// Re-registering an existing `name` replaces it.
    fn set_timer(&self, name: &str, interval: Duration, callback: ClockCallback);

    /// Register a one-shot alert firing at `trigger_time`. Re-registering an existing `name`
    /// replaces it.
    fn set_alert(&self, name: &str, trigger_time: DateTime<Utc>, callback: ClockCallback);

    /// Cancel a registered timer or alert. A no-op if `name` is not registered.
    fn cancel(&self, name: &str);
}
