//! Candidate idea model, theorizer boundary, and strategy adapter trait for the conveyor
//! pipeline's `theorize` and `evaluate` nodes.

mod adapter;
mod error;
mod model;
mod theorizer;

pub use adapter::StrategyAdapter;
pub use error::{Result, StrategyError};
pub use model::{CandidateContext, CandidateIdea, Category, Condition, Regime, RiskParameters, Status};
pub use theorizer::{validate, Theorizer};
