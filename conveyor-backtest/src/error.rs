use thiserror::Error;

/// Crate-local `Result` alias.
pub type Result<T> = std::result::Result<T, BacktestError>;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("bar sequence is empty")]
    EmptyBars,

    #[error("bar sequence is not time-sorted: bar {index} at {timestamp} precedes the previous bar")]
    UnsortedBars {
        index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    #[error("strategy callback panicked: {0}")]
    StrategyError(String),
}
