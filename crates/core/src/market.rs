//! Exchange-facing market data types.
//!
//! All financial values use `rust_decimal::Decimal` for precision.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trading rules for a spot pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMeta {
    /// Pair in exchange form (e.g. `BTC-USDT`).
    pub pair: String,
    /// Smallest tradeable base quantity.
    pub base_min_size: Decimal,
    /// Base quantity granularity.
    pub base_increment: Decimal,
    /// Quote funds granularity.
    pub quote_increment: Decimal,
}

/// One OHLC candle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    /// Start of the candle interval.
    pub start: DateTime<Utc>,
    pub open: Decimal,
    pub close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
}

impl Candle {
    /// End of the candle interval for the given duration.
    #[must_use]
    pub fn end(&self, interval: chrono::Duration) -> DateTime<Utc> {
        self.start + interval
    }
}

/// Execution result of an order, as reported by the exchange.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderFill {
    /// Base quantity actually filled.
    pub size: Decimal,
    /// Quote funds actually exchanged.
    pub funds: Decimal,
}

impl OrderFill {
    /// Average execution price, or `None` for an unfilled order.
    #[must_use]
    pub fn avg_price(&self) -> Option<Decimal> {
        if self.size > Decimal::ZERO {
            Some(self.funds / self.size)
        } else {
            None
        }
    }
}
