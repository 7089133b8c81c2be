//! Cycle state and the `apply` merge rule (spec.md §3 "Cycle State", §4.3 "State update rule").

use chrono::{DateTime, Utc};
use conveyor_backtest::Signal;
use conveyor_execution::ExecutionOutcome;
use conveyor_queue::EvaluationResult;
use conveyor_risk::SafetyGateReport;
use conveyor_strategy::{CandidateContext, CandidateIdea};
use serde::{Deserialize, Serialize};

/// Terminal/in-progress tag for a cycle. Non-`Running` values are set by the orchestrator loop,
/// never by a node directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CycleStatus {
    Running,
    Completed,
    /// A step returned no actionable work (spec.md §7 "Data absent ... cycle step returns
    /// `*_EMPTY`; pipeline continues").
    SkippedEmpty(String),
    /// A critical step's breaker was open; the cycle ends without executing (spec.md §4.3
    /// "a breaker trip means the cycle skips execute and ends with `SKIPPED_*` status").
    SkippedCircuitBreaker(String),
    SkippedSafetyGate,
    EmergencyHalt,
    Failed(String),
}

/// Per-cycle record owned exclusively by one orchestrator invocation (spec.md §3 "Ownership").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleState {
    pub cycle_id: String,
    pub cycle_number: u64,
    pub started_at: DateTime<Utc>,
    pub current_step: String,
    /// Newest entry first (`add_thought`/`add_error` prepend, spec.md §4.3).
    pub thoughts: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub context: Option<CandidateContext>,
    pub candidates: Vec<CandidateIdea>,
    pub evaluation_results: Vec<EvaluationResult>,
    pub selected: Option<CandidateIdea>,
    pub signal: Option<Signal>,
    pub risk_assessment: Option<SafetyGateReport>,
    pub execution_outcome: Option<ExecutionOutcome>,
    pub status: CycleStatus,
}

impl CycleState {
    /// `createInitial` (spec.md §3 "Mutation rule").
    pub fn create_initial(cycle_id: impl Into<String>, cycle_number: u64, now: DateTime<Utc>) -> Self {
        Self {
            cycle_id: cycle_id.into(),
            cycle_number,
            started_at: now,
            current_step: "context".to_string(),
            thoughts: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            context: None,
            candidates: Vec::new(),
            evaluation_results: Vec::new(),
            selected: None,
            signal: None,
            risk_assessment: None,
            execution_outcome: None,
            status: CycleStatus::Running,
        }
    }
}

/// A step's proposed update to [`CycleState`]. Every field is `Option`: `None` means "no-op",
/// `Some` means "replace" (spec.md §4.3 "State update rule" — our domain payload has no nested
/// maps needing union-merge, only scalars, options, and lists; lists are always carried as the
/// full new value by the returning node, matching "Appending lists ... is always done by the
/// returned partial carrying the full new list").
#[derive(Debug, Clone, Default)]
pub struct CyclePartial {
    pub current_step: Option<String>,
    pub thoughts: Option<Vec<String>>,
    pub errors: Option<Vec<String>>,
    pub warnings: Option<Vec<String>>,
    pub context: Option<CandidateContext>,
    pub candidates: Option<Vec<CandidateIdea>>,
    pub evaluation_results: Option<Vec<EvaluationResult>>,
    pub selected: Option<Option<CandidateIdea>>,
    pub signal: Option<Option<Signal>>,
    pub risk_assessment: Option<Option<SafetyGateReport>>,
    pub execution_outcome: Option<Option<ExecutionOutcome>>,
    pub status: Option<CycleStatus>,
}

impl CyclePartial {
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    pub fn with_status(mut self, status: CycleStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Prepend an ISO-8601-timestamped entry to the thought log (spec.md §4.3 "`addThought` and
    /// `addError` prepend an ISO-8601 timestamp").
    pub fn add_thought(mut self, state: &CycleState, message: impl AsRef<str>, now: DateTime<Utc>) -> Self {
        let mut thoughts = self.thoughts.take().unwrap_or_else(|| state.thoughts.clone());
        thoughts.insert(0, format!("[{}] {}", now.to_rfc3339(), message.as_ref()));
        self.thoughts = Some(thoughts);
        self
    }

    pub fn add_error(mut self, state: &CycleState, message: impl AsRef<str>, now: DateTime<Utc>) -> Self {
        let mut errors = self.errors.take().unwrap_or_else(|| state.errors.clone());
        errors.insert(0, format!("[{}] {}", now.to_rfc3339(), message.as_ref()));
        self.errors = Some(errors);
        self
    }

    pub fn add_warning(mut self, state: &CycleState, message: impl AsRef<str>, now: DateTime<Utc>) -> Self {
        let mut warnings = self.warnings.take().unwrap_or_else(|| state.warnings.clone());
        warnings.insert(0, format!("[{}] {}", now.to_rfc3339(), message.as_ref()));
        self.warnings = Some(warnings);
        self
    }
}

/// `apply(state, partial)`: for every field set in `partial`, replace; otherwise keep `state`'s
/// existing value. No node mutates its input; all progression is by return value.
pub fn apply(state: &CycleState, partial: CyclePartial) -> CycleState {
    CycleState {
        cycle_id: state.cycle_id.clone(),
        cycle_number: state.cycle_number,
        started_at: state.started_at,
        current_step: partial.current_step.unwrap_or_else(|| state.current_step.clone()),
        thoughts: partial.thoughts.unwrap_or_else(|| state.thoughts.clone()),
        errors: partial.errors.unwrap_or_else(|| state.errors.clone()),
        warnings: partial.warnings.unwrap_or_else(|| state.warnings.clone()),
        context: partial.context.or(state.context),
        candidates: partial.candidates.unwrap_or_else(|| state.candidates.clone()),
        evaluation_results: partial.evaluation_results.unwrap_or_else(|| state.evaluation_results.clone()),
        selected: partial.selected.unwrap_or_else(|| state.selected.clone()),
        signal: partial.signal.unwrap_or_else(|| state.signal.clone()),
        risk_assessment: partial.risk_assessment.unwrap_or_else(|| state.risk_assessment.clone()),
        execution_outcome: partial.execution_outcome.unwrap_or_else(|| state.execution_outcome.clone()),
        status: partial.status.unwrap_or_else(|| state.status.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_replaces_only_fields_present_in_partial() {
        let now = Utc::now();
        let state = CycleState::create_initial("cycle-1", 1, now);

        let partial = CyclePartial::default().with_step("theorize").add_thought(&state, "starting theorize", now);
        let next = apply(&state, partial);

        assert_eq!(next.current_step, "theorize");
        assert_eq!(next.thoughts.len(), 1);
        assert_eq!(next.cycle_id, "cycle-1");
        assert!(next.candidates.is_empty());
    }

    #[test]
    fn add_error_prepends_newest_first() {
        let now = Utc::now();
        let state = CycleState::create_initial("cycle-1", 1, now);
        let first = apply(&state, CyclePartial::default().add_error(&state, "first", now));
        let second = apply(&first, CyclePartial::default().add_error(&first, "second", now));

        assert_eq!(second.errors.len(), 2);
        assert!(second.errors[0].ends_with("second"));
        assert!(second.errors[1].ends_with("first"));
    }
}
