//! Risk trackers (exposure, drawdown, correlation, position, volatility) plus the
//! pre-execution safety gate that gatekeeps the executor step of the pipeline.

pub mod alert;
pub mod correlation;
pub mod drawdown;
pub mod exposure;
pub mod gate;
pub mod position_tracker;
pub mod volatility;

pub use alert::{RiskAlertHook, RiskViolation, VecAlertHook};
pub use gate::{
    Anomaly, GateError, SafetyCheck, SafetyGate, SafetyGateConfig, SafetyGateInput,
    SafetyGateReport, Severity,
};
