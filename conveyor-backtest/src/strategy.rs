use crate::types::{Bar, ExitSignal, OpenPosition, Signal};

/// Pure function of current bar and (optional) open position — no I/O, so the engine can call
/// it synchronously inside the deterministic per-bar loop.
///
/// The upstream candidate/context model lives above this crate (in the strategy adapter layer);
/// the engine only needs a position-aware signal generator, which is what this trait exposes.
pub trait Strategy {
    fn generate_signals(&self, bar: &Bar, position: Option<&OpenPosition>) -> Vec<Signal>;

    fn exit(&self, bar: &Bar, position: &OpenPosition) -> Option<ExitSignal>;
}
