use crate::{
    error::{Result, StrategyError},
    model::{CandidateContext, CandidateIdea},
};
use chrono::{DateTime, Utc};
use conveyor_instrument::InstrumentIndex;

/// Produces [`CandidateIdea`]s from a market context snapshot. This is the orchestrator's
/// `theorize` node boundary; what makes a good candidate is explicitly out of scope here (spec:
/// "strategy quality, indicator math" are non-goals) — the core only needs candidates to flow
/// through the pipeline with a stable shape.
pub trait Theorizer {
    fn theorize(
        &self,
        context: &CandidateContext,
        instruments: &[InstrumentIndex],
        now: DateTime<Utc>,
    ) -> Result<Vec<CandidateIdea>>;
}

/// Validates a candidate's confidence bound before it is allowed to queue, independent of
/// which [`Theorizer`] produced it.
pub fn validate(candidate: &CandidateIdea) -> Result<()> {
    if candidate.target_instruments.is_empty() {
        return Err(StrategyError::NoTargetInstruments(candidate.id.clone()));
    }
    if !(0.0..=1.0).contains(&candidate.confidence) {
        return Err(StrategyError::ConfidenceOutOfRange(candidate.confidence));
    }
    Ok(())
}
