use chrono::Duration;
use derive_more::Constructor;

/// Threshold and reset timeout for a named breaker.
///
/// Default configs per the pipeline's three breaker families: `execute` breakers trip after 3
/// consecutive failures and stay open 60s; RPC breakers trip after 5 and stay open 30s;
/// evaluation-fetch breakers trip after 10 and stay open 120s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Constructor)]
pub struct BreakerConfig {
    pub threshold: u32,
    pub reset: Duration,
}

impl BreakerConfig {
    pub fn execute() -> Self {
        Self::new(3, Duration::seconds(60))
    }

    pub fn rpc() -> Self {
        Self::new(5, Duration::seconds(30))
    }

    pub fn evaluation_fetch() -> Self {
        Self::new(10, Duration::seconds(120))
    }
}
