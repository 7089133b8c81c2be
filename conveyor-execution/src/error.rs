use thiserror::Error;

/// Crate-local `Result` alias.
pub type Result<T> = std::result::Result<T, ExecutionError>;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("venue rejected order: {0}")]
    Rejected(String),

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("venue call timed out after {0}ms")]
    Timeout(u64),
}
