use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Venue-agnostic identifier for a tradable asset (eg/ `btc`, `usdt`).
///
/// Two instruments quoted against the same underlying `Asset` on different
/// exchanges share this identifier, which is what lets exposure and
/// correlation trackers aggregate across venues.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, Constructor,
)]
#[display("{name_internal}")]
pub struct Asset {
    pub name_internal: SmolStr,
}

impl Asset {
    pub fn new_from_exchange(name_exchange: impl Into<SmolStr>) -> Self {
        Self {
            name_internal: SmolStr::new(name_exchange.into().to_lowercase()),
        }
    }
}

/// Position of an [`Asset`] in an indexed collection, used as a lightweight key in place of
/// the full `Asset` once the collection has been built.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor, Display,
)]
#[display("AssetIndex({_0})")]
pub struct AssetIndex(pub usize);

impl AssetIndex {
    pub fn index(&self) -> usize {
        self.0
    }
}
