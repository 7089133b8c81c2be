use crate::{error::Result, types::Bar};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_instrument::InstrumentIndex;

/// External historical-data boundary (spec.md §6 "Bar provider"): returns a time-sorted slice,
/// empty meaning "no data." All data for a replay is fetched through this trait before
/// [`crate::BacktestEngine::run`] begins — the engine itself performs no I/O.
#[async_trait]
pub trait BarProvider: Send + Sync {
    async fn get_bars(
        &self,
        instrument: InstrumentIndex,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>>;
}
