use thiserror::Error;

/// Crate-local `Result` alias.
pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("queue is paused")]
    Paused,

    #[error("job '{0}' not found")]
    JobNotFound(String),

    #[error("job '{0}' is not currently held by the claiming worker")]
    NotOwner(String),

    #[error("redis transport error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to (de)serialize job payload: {0}")]
    Serde(#[from] serde_json::Error),
}
