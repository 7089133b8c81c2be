use crate::types::{Bar, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const BPS_DIVISOR: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// How a bar's OHLC range is translated into an execution price for a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillModel {
    /// Mid-of-range touch point, adjusted by slippage against the order's direction.
    Standard,
    /// Always the worse-for-the-trader side of the bar's range, before slippage.
    Pessimistic,
    /// Bar open, adjusted by half the configured slippage.
    Optimistic,
}

impl FillModel {
    /// Resolve the execution price for a `side` order filling against `bar`, given
    /// `slippage_bps` from engine configuration.
    pub fn fill_price(&self, bar: &Bar, side: Side, slippage_bps: Decimal) -> Decimal {
        let slippage = slippage_bps / BPS_DIVISOR;

        match self {
            FillModel::Standard => {
                let touch = (bar.open + bar.close) / Decimal::TWO;
                apply_slippage(touch, side, slippage)
            }
            FillModel::Pessimistic => {
                let touch = match side {
                    Side::Long => bar.high,
                    Side::Short => bar.low,
                };
                apply_slippage(touch, side, slippage)
            }
            FillModel::Optimistic => apply_slippage(bar.open, side, slippage / Decimal::TWO),
        }
    }
}

fn apply_slippage(price: Decimal, side: Side, slippage: Decimal) -> Decimal {
    // Buys pay up, sells give up price: slippage always moves the fill against the trader.
    price * (Decimal::ONE + side.sign() * slippage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conveyor_instrument::InstrumentIndex;
    use rust_decimal_macros::dec;

    fn bar() -> Bar {
        Bar {
            instrument: InstrumentIndex::new(0),
            timestamp: Utc::now(),
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100.5),
            volume: dec!(1000),
            best_bid: None,
            best_ask: None,
            bid_size: None,
            ask_size: None,
            vwap: None,
        }
    }

    #[test]
    fn pessimistic_always_worse_than_standard_for_buys() {
        let b = bar();
        let standard = FillModel::Standard.fill_price(&b, Side::Long, dec!(5));
        let pessimistic = FillModel::Pessimistic.fill_price(&b, Side::Long, dec!(5));
        assert!(pessimistic >= standard);
    }

    #[test]
    fn optimistic_uses_half_slippage() {
        let b = bar();
        let optimistic = FillModel::Optimistic.fill_price(&b, Side::Long, dec!(10));
        let expected = b.open * (Decimal::ONE + dec!(0.0005));
        assert_eq!(optimistic, expected);
    }
}
