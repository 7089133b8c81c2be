use crate::instrument::kind::{
    future::FutureContract, option::OptionContract, perpetual::PerpetualContract,
};
use serde::{Deserialize, Serialize};

pub mod future;
pub mod option;
pub mod perpetual;

/// Market mechanics of an [`Instrument`](crate::instrument::Instrument) (eg/ Spot, Perpetual).
///
/// # Type Parameters
/// * `AssetKey` - Type used to identify the settlement asset for a derivative contract.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstrumentKind<AssetKey> {
    Spot,
    Perpetual(PerpetualContract<AssetKey>),
    Future(FutureContract<AssetKey>),
    Option(OptionContract<AssetKey>),
}

impl<AssetKey> InstrumentKind<AssetKey> {
    /// Return the &str representation of this [`InstrumentKind`], ignoring contract fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Perpetual(_) => "perpetual",
            Self::Future(_) => "future",
            Self::Option(_) => "option",
        }
    }

    /// `true` if this [`InstrumentKind`] expires (ie/ is a [`Future`](Self::Future) or
    /// [`Option`](Self::Option)).
    pub fn has_expiry(&self) -> bool {
        matches!(self, Self::Future(_) | Self::Option(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_has_no_expiry() {
        assert!(!InstrumentKind::<u64>::Spot.has_expiry());
        assert_eq!(InstrumentKind::<u64>::Spot.as_str(), "spot");
    }
}
