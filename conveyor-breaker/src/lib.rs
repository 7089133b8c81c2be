//! Named circuit breaker primitive.
//!
//! A breaker wraps a fallible operation identified by name: after `threshold` consecutive
//! failures it opens and, until `reset` has elapsed, short-circuits every call to either a
//! fallback or a [`BreakerError::Open`]. Breaker state is process-local and shared by handle,
//! following the teacher's `parking_lot::Mutex`-guarded shared-state convention
//! (`jackbot-risk`'s `VecAlertHook`).

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

mod config;
mod state;

pub use config::BreakerConfig;
pub use state::BreakerStatus;

use state::BreakerState;

/// Crate-local `Result` alias.
pub type Result<T> = std::result::Result<T, BreakerError>;

#[derive(Debug, Error)]
pub enum BreakerError {
    #[error("circuit breaker '{0}' is open")]
    Open(String),
    #[error("circuit breaker '{0}' is not registered")]
    Unregistered(String),
}

/// A function supplying the current time, injected so breaker reset timing is testable without
/// real sleeps. Defaults to [`Utc::now`].
pub type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn default_now() -> NowFn {
    Arc::new(Utc::now)
}

/// Registry of named circuit breakers, shared across the orchestrator and safety gate.
///
/// Breakers are created lazily on first use with a supplied [`BreakerConfig`]; subsequent calls
/// under the same name reuse the registered config and accumulated failure count.
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, parking_lot::Mutex<BreakerState>>>,
    now: NowFn,
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("names", &self.breakers.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            now: default_now(),
        }
    }

    /// Construct a registry with an injected clock, for deterministic reset-timeout tests.
    pub fn with_clock(now: NowFn) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            now,
        }
    }

    fn entry(&self, name: &str, config: BreakerConfig) {
        let needs_insert = !self.breakers.read().contains_key(name);
        if needs_insert {
            self.breakers
                .write()
                .entry(name.to_string())
                .or_insert_with(|| parking_lot::Mutex::new(BreakerState::new(config)));
        }
    }

    /// Run `op` under the named breaker, registering it with `config` if not already known.
    ///
    /// If the breaker is open and `reset` has not elapsed, `op` is skipped and `fallback` (if
    /// provided) supplies the return value; otherwise [`BreakerError::Open`] is returned. On
    /// success the failure counter resets to zero; on failure it increments and, on reaching
    /// `threshold`, the breaker opens.
    pub fn execute<T, E, Op, Fallback>(
        &self,
        name: &str,
        config: BreakerConfig,
        op: Op,
        fallback: Option<Fallback>,
    ) -> Result<T>
    where
        Op: FnOnce() -> std::result::Result<T, E>,
        Fallback: FnOnce() -> T,
    {
        self.entry(name, config);
        let now = (self.now)();

        let should_skip = {
            let guard = self.breakers.read();
            let mut state = guard.get(name).expect("just inserted").lock();
            state.should_skip(now)
        };

        if should_skip {
            tracing::warn!(breaker = name, "breaker open, skipping op");
            return match fallback {
                Some(fallback) => Ok(fallback()),
                None => Err(BreakerError::Open(name.to_string())),
            };
        }

        match op() {
            Ok(value) => {
                let guard = self.breakers.read();
                guard.get(name).expect("just inserted").lock().record_success();
                Ok(value)
            }
            Err(_) => {
                let guard = self.breakers.read();
                let opened = guard
                    .get(name)
                    .expect("just inserted")
                    .lock()
                    .record_failure(now);
                if opened {
                    tracing::warn!(breaker = name, "breaker tripped open");
                }
                match fallback {
                    Some(fallback) => Ok(fallback()),
                    None => Err(BreakerError::Open(name.to_string())),
                }
            }
        }
    }

    /// Async counterpart to [`BreakerRegistry::execute`], for node bodies that await I/O (queue
    /// claims, venue calls). Identical skip/record semantics; the internal lock is never held
    /// across the `.await` point.
    pub async fn execute_async<T, E, Fut, Fallback>(
        &self,
        name: &str,
        config: BreakerConfig,
        op: impl FnOnce() -> Fut,
        fallback: Option<Fallback>,
    ) -> Result<T>
    where
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
        Fallback: FnOnce() -> T,
    {
        self.entry(name, config);
        let now = (self.now)();

        let should_skip = {
            let guard = self.breakers.read();
            let mut state = guard.get(name).expect("just inserted").lock();
            state.should_skip(now)
        };

        if should_skip {
            tracing::warn!(breaker = name, "breaker open, skipping op");
            return match fallback {
                Some(fallback) => Ok(fallback()),
                None => Err(BreakerError::Open(name.to_string())),
            };
        }

        match op().await {
            Ok(value) => {
                let guard = self.breakers.read();
                guard.get(name).expect("just inserted").lock().record_success();
                Ok(value)
            }
            Err(_) => {
                let guard = self.breakers.read();
                let opened = guard
                    .get(name)
                    .expect("just inserted")
                    .lock()
                    .record_failure(now);
                if opened {
                    tracing::warn!(breaker = name, "breaker tripped open");
                }
                match fallback {
                    Some(fallback) => Ok(fallback()),
                    None => Err(BreakerError::Open(name.to_string())),
                }
            }
        }
    }

    /// Force the named breaker open immediately, registering it with `config` if unknown.
    pub fn open_breaker(&self, name: &str, config: BreakerConfig) {
        self.entry(name, config);
        let now = (self.now)();
        let guard = self.breakers.read();
        guard.get(name).expect("just inserted").lock().force_open(now);
    }

    /// Reset the named breaker to closed with a zeroed failure count.
    pub fn reset_breaker(&self, name: &str) -> Result<()> {
        let guard = self.breakers.read();
        let state = guard
            .get(name)
            .ok_or_else(|| BreakerError::Unregistered(name.to_string()))?;
        state.lock().reset();
        Ok(())
    }

    pub fn get_status(&self, name: &str) -> Result<BreakerStatus> {
        let guard = self.breakers.read();
        let state = guard
            .get(name)
            .ok_or_else(|| BreakerError::Unregistered(name.to_string()))?;
        Ok(state.lock().status())
    }
}
