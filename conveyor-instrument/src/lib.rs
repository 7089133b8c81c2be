//! Core exchange, asset and instrument value types shared across the pipeline.
//!
//! Nothing in this crate is async or stateful beyond [`index::IndexedInstruments`] — it exists
//! so that every other crate can refer to the same tradable-instrument vocabulary without
//! depending on an exchange integration layer.

pub mod asset;
pub mod exchange;
pub mod index;
pub mod instrument;

pub use asset::{Asset, AssetIndex};
pub use exchange::{ExchangeId, ExchangeIndex};
pub use index::{IndexedInstruments, IndexedInstrumentsBuilder, error::IndexError};
pub use instrument::{Instrument, InstrumentId, InstrumentIndex, Underlying, kind::InstrumentKind};
