use crate::instrument::kind::InstrumentKind;
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::Formatter;

/// Defines an [`Instrument`]s [`InstrumentKind`] (eg/ Spot, Perpetual, etc).
pub mod kind;

/// Unique identifier for an `Instrument` traded on an execution, stable across restarts.
///
/// Used to key data events in a memory efficient way.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, derive_more::Display,
)]
pub struct InstrumentId(pub u64);

/// Position of an [`Instrument`] in an indexed collection, used as a lightweight key in place
/// of the full `Instrument` once the collection has been built.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct InstrumentIndex(pub usize);

impl InstrumentIndex {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for InstrumentIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "InstrumentIndex({})", self.0)
    }
}

/// Base/quote pair underlying an [`Instrument`].
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor)]
pub struct Underlying<AssetKey> {
    pub base: AssetKey,
    pub quote: AssetKey,
}

/// Instrument model containing the data required to identify a tradable instrument and route
/// orders against it correctly.
///
/// # Type Parameters
/// * `ExchangeKey` - Type used to identify the execution this `Instrument` trades on.
/// * `AssetKey` - Type used to identify this `Instrument`s underlying base and quote assets.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct Instrument<ExchangeKey, AssetKey> {
    pub exchange: ExchangeKey,
    pub name: SmolStr,
    pub underlying: Underlying<AssetKey>,
    #[serde(alias = "instrument_kind")]
    pub kind: InstrumentKind<AssetKey>,
}

impl<ExchangeKey, AssetKey> Instrument<ExchangeKey, AssetKey> {
    pub fn new(
        exchange: ExchangeKey,
        name: impl Into<SmolStr>,
        underlying: Underlying<AssetKey>,
        kind: InstrumentKind<AssetKey>,
    ) -> Self {
        Self {
            exchange,
            name: name.into(),
            underlying,
            kind,
        }
    }

    /// Construct a new `Spot` `Instrument` with the provided data.
    pub fn spot(
        exchange: ExchangeKey,
        name: impl Into<SmolStr>,
        underlying: Underlying<AssetKey>,
    ) -> Self {
        Self::new(exchange, name, underlying, InstrumentKind::Spot)
    }

    /// Map this Instrument's `ExchangeKey` to a new key.
    pub fn map_exchange_key<NewExchangeKey>(
        self,
        exchange: NewExchangeKey,
    ) -> Instrument<NewExchangeKey, AssetKey> {
        Instrument {
            exchange,
            name: self.name,
            underlying: self.underlying,
            kind: self.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeId;

    #[test]
    fn spot_constructor_sets_spot_kind() {
        let instrument = Instrument::spot(
            ExchangeId::BinanceSpot,
            "btc_usdt",
            Underlying::new("btc", "usdt"),
        );

        assert_eq!(instrument.kind, InstrumentKind::Spot);
        assert_eq!(instrument.name, "btc_usdt");
    }
}
