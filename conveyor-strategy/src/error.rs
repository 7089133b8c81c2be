use thiserror::Error;

/// Crate-local `Result` alias.
pub type Result<T> = std::result::Result<T, StrategyError>;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("candidate idea '{0}' has no target instruments")]
    NoTargetInstruments(String),

    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("theorizer produced no candidates for the supplied context")]
    NoCandidates,
}
