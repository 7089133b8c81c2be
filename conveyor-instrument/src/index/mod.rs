use crate::{
    asset::{Asset, AssetIndex},
    exchange::{ExchangeId, ExchangeIndex},
    instrument::{Instrument, InstrumentIndex},
};
use error::IndexError;
use std::collections::HashMap;

/// [`IndexError`] returned when an identifier cannot be resolved to an index.
pub mod error;

/// Indexed collection of [`Instrument`]s, [`Asset`]s and [`ExchangeId`]s, providing O(1)
/// index lookups keyed by their natural identifiers.
///
/// Built once at startup from configuration and then shared (read-only) across the pipeline,
/// so that hot paths can key state by cheap `Copy` indices instead of cloning names.
#[derive(Debug, Clone, Default)]
pub struct IndexedInstruments {
    exchanges: Vec<ExchangeId>,
    assets: Vec<Asset>,
    instruments: Vec<Instrument<ExchangeIndex, AssetIndex>>,
    exchange_index: HashMap<ExchangeId, ExchangeIndex>,
    asset_index: HashMap<Asset, AssetIndex>,
    instrument_index: HashMap<(ExchangeIndex, smol_str::SmolStr), InstrumentIndex>,
}

impl IndexedInstruments {
    pub fn builder() -> IndexedInstrumentsBuilder {
        IndexedInstrumentsBuilder::default()
    }

    pub fn exchanges(&self) -> &[ExchangeId] {
        &self.exchanges
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn instruments(&self) -> &[Instrument<ExchangeIndex, AssetIndex>] {
        &self.instruments
    }

    pub fn find_exchange_index(&self, exchange: ExchangeId) -> Result<ExchangeIndex, IndexError> {
        self.exchange_index
            .get(&exchange)
            .copied()
            .ok_or_else(|| IndexError::ExchangeIndex(exchange.to_string()))
    }

    pub fn find_asset_index(&self, asset: &Asset) -> Result<AssetIndex, IndexError> {
        self.asset_index
            .get(asset)
            .copied()
            .ok_or_else(|| IndexError::AssetIndex(asset.to_string()))
    }

    pub fn find_instrument_index(
        &self,
        exchange: ExchangeIndex,
        name: &str,
    ) -> Result<InstrumentIndex, IndexError> {
        self.instrument_index
            .get(&(exchange, smol_str::SmolStr::new(name)))
            .copied()
            .ok_or_else(|| {
                IndexError::InstrumentIndex(format!("{exchange}/{name}"))
            })
    }

    pub fn instrument(&self, index: InstrumentIndex) -> &Instrument<ExchangeIndex, AssetIndex> {
        &self.instruments[index.index()]
    }
}

/// Builder for an [`IndexedInstruments`] collection.
///
/// Assets and exchanges are de-duplicated and assigned a stable index the first time they are
/// referenced by an added instrument.
#[derive(Debug, Clone, Default)]
pub struct IndexedInstrumentsBuilder {
    exchanges: Vec<ExchangeId>,
    assets: Vec<Asset>,
    instruments: Vec<Instrument<ExchangeIndex, AssetIndex>>,
    exchange_index: HashMap<ExchangeId, ExchangeIndex>,
    asset_index: HashMap<Asset, AssetIndex>,
}

impl IndexedInstrumentsBuilder {
    fn exchange_index_of(&mut self, exchange: ExchangeId) -> ExchangeIndex {
        if let Some(index) = self.exchange_index.get(&exchange) {
            return *index;
        }

        let index = ExchangeIndex::new(self.exchanges.len());
        self.exchanges.push(exchange);
        self.exchange_index.insert(exchange, index);
        index
    }

    fn asset_index_of(&mut self, asset: Asset) -> AssetIndex {
        if let Some(index) = self.asset_index.get(&asset) {
            return *index;
        }

        let index = AssetIndex::new(self.assets.len());
        self.assets.push(asset);
        self.asset_index.insert(asset, index);
        index
    }

    /// Add an [`Instrument`] keyed by exchange identifier and asset, assigning new indices to
    /// any exchange or asset not already present in the builder.
    pub fn add_instrument(mut self, instrument: Instrument<ExchangeId, Asset>) -> Self {
        let exchange = self.exchange_index_of(instrument.exchange);
        let base = self.asset_index_of(instrument.underlying.base);
        let quote = self.asset_index_of(instrument.underlying.quote);

        let kind = match instrument.kind {
            crate::instrument::kind::InstrumentKind::Spot => {
                crate::instrument::kind::InstrumentKind::Spot
            }
            crate::instrument::kind::InstrumentKind::Perpetual(contract) => {
                crate::instrument::kind::InstrumentKind::Perpetual(
                    crate::instrument::kind::perpetual::PerpetualContract {
                        contract_size: contract.contract_size,
                        settlement_asset: self.asset_index_of(contract.settlement_asset),
                    },
                )
            }
            crate::instrument::kind::InstrumentKind::Future(contract) => {
                crate::instrument::kind::InstrumentKind::Future(
                    crate::instrument::kind::future::FutureContract {
                        contract_size: contract.contract_size,
                        settlement_asset: self.asset_index_of(contract.settlement_asset),
                        expiry: contract.expiry,
                    },
                )
            }
            crate::instrument::kind::InstrumentKind::Option(contract) => {
                crate::instrument::kind::InstrumentKind::Option(
                    crate::instrument::kind::option::OptionContract {
                        contract_size: contract.contract_size,
                        settlement_asset: self.asset_index_of(contract.settlement_asset),
                        kind: contract.kind,
                        exercise: contract.exercise,
                        expiry: contract.expiry,
                        strike: contract.strike,
                    },
                )
            }
        };

        self.instruments.push(Instrument {
            exchange,
            name: instrument.name,
            underlying: crate::instrument::Underlying::new(base, quote),
            kind,
        });

        self
    }

    pub fn build(self) -> IndexedInstruments {
        let mut instrument_index = HashMap::with_capacity(self.instruments.len());
        for (position, instrument) in self.instruments.iter().enumerate() {
            instrument_index.insert(
                (instrument.exchange, instrument.name.clone()),
                InstrumentIndex::new(position),
            );
        }

        IndexedInstruments {
            exchanges: self.exchanges,
            assets: self.assets,
            instruments: self.instruments,
            exchange_index: self.exchange_index,
            asset_index: self.asset_index,
            instrument_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Underlying;

    #[test]
    fn builder_deduplicates_exchanges_and_assets() {
        let indexed = IndexedInstruments::builder()
            .add_instrument(Instrument::spot(
                ExchangeId::BinanceSpot,
                "btc_usdt",
                Underlying::new(Asset::new_from_exchange("BTC"), Asset::new_from_exchange("USDT")),
            ))
            .add_instrument(Instrument::spot(
                ExchangeId::BinanceSpot,
                "eth_usdt",
                Underlying::new(Asset::new_from_exchange("ETH"), Asset::new_from_exchange("USDT")),
            ))
            .build();

        assert_eq!(indexed.exchanges().len(), 1);
        assert_eq!(indexed.assets().len(), 3);
        assert_eq!(indexed.instruments().len(), 2);

        let exchange = indexed.find_exchange_index(ExchangeId::BinanceSpot).unwrap();
        assert_eq!(
            indexed.find_instrument_index(exchange, "btc_usdt").unwrap(),
            InstrumentIndex::new(0)
        );
    }

    #[test]
    fn unknown_exchange_errors() {
        let indexed = IndexedInstruments::builder().build();
        assert!(matches!(
            indexed.find_exchange_index(ExchangeId::Coinbase),
            Err(IndexError::ExchangeIndex(_))
        ));
    }
}
