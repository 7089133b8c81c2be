use crate::model::CandidateContext;
use conveyor_backtest::{Bar, ExitSignal, OpenPosition, Signal};

/// External strategy-adapter interface (spec.md §6 "Strategy adapter"): pure functions of the
/// current regime context and bar, no I/O. This is the boundary the pipeline calls across; it
/// is intentionally wider than [`conveyor_backtest::Strategy`], which only needs the currently
/// open position and is what the backtest engine's per-bar loop actually drives. An
/// implementation of `StrategyAdapter` is expected to also implement `conveyor_backtest::Strategy`
/// (or wrap one) so a candidate can be run through both the live pipeline and the backtest
/// engine with identical signal logic.
pub trait StrategyAdapter {
    fn generate_signals(&self, context: &CandidateContext, bar: &Bar) -> Vec<Signal>;

    fn exit(&self, bar: &Bar, position: &OpenPosition) -> Option<ExitSignal>;
}
