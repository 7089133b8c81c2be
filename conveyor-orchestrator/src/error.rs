use thiserror::Error;

/// Crate-local `Result` alias.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("orchestrator config invalid: {0}")]
    InvalidConfig(String),

    #[error("breaker error: {0}")]
    Breaker(#[from] conveyor_breaker::BreakerError),

    #[error("queue error: {0}")]
    Queue(#[from] conveyor_queue::QueueError),

    #[error("safety gate error: {0}")]
    Gate(#[from] conveyor_risk::GateError),

    #[error("emergency halt is set")]
    EmergencyHalt,

    /// A node failed for a reason that is not itself a breaker trip (bad data, a rejected
    /// persistence write, an unreachable collaborator). The step wrapper still routes it through
    /// the step's breaker, so repeated node failures trip the breaker exactly like a raw `Err`
    /// from any other op (spec.md §7 `[ADD]` "the orchestrator's step wrapper converting both a
    /// returned `Err` and a caught panic ... into a single `StepOutcome::Failure`").
    #[error("node failed: {0}")]
    Node(String),

    /// A node panicked; caught by the step wrapper's `catch_unwind` and folded into the same
    /// failure path a returned `Err` takes.
    #[error("node panicked")]
    NodePanic,
}
