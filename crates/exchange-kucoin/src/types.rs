//! Raw KuCoin API payloads and their conversions into core market types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracktrade_core::market::{Candle, OrderFill, SymbolMeta};

use crate::error::{KucoinError, Result};

/// Business code KuCoin returns on success.
pub const SUCCESS_CODE: &str = "200000";

/// Standard KuCoin response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    pub code: String,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwraps the payload, converting a non-success code into an API error.
    pub fn into_data(self) -> Result<T> {
        if self.code != SUCCESS_CODE {
            return Err(KucoinError::api(
                self.code,
                self.msg.unwrap_or_else(|| "request failed".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| KucoinError::Serialization("missing data field".to_string()))
    }
}

/// Level-1 ticker payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTicker {
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub best_bid: Option<Decimal>,
    #[serde(default)]
    pub best_ask: Option<Decimal>,
}

impl RawTicker {
    /// Preferred price: last trade, then best bid, then best ask.
    #[must_use]
    pub fn preferred_price(&self) -> Option<Decimal> {
        self.price.or(self.best_bid).or(self.best_ask)
    }
}

/// Entry of the symbol list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSymbol {
    pub symbol: String,
    #[serde(default)]
    pub base_min_size: Option<Decimal>,
    #[serde(default)]
    pub base_increment: Option<Decimal>,
    #[serde(default)]
    pub quote_increment: Option<Decimal>,
}

impl From<RawSymbol> for SymbolMeta {
    fn from(raw: RawSymbol) -> Self {
        let base_min_size = raw.base_min_size.unwrap_or(Decimal::ZERO);
        // Exchanges occasionally omit increments; fall back the way the
        // trading rules imply: size granularity defaults to the minimum
        // size, funds granularity to one hundredth of a cent.
        let base_increment = raw
            .base_increment
            .filter(|inc| *inc > Decimal::ZERO)
            .unwrap_or(base_min_size);
        let quote_increment = raw
            .quote_increment
            .filter(|inc| *inc > Decimal::ZERO)
            .unwrap_or_else(|| Decimal::new(1, 4));
        Self {
            pair: raw.symbol,
            base_min_size,
            base_increment,
            quote_increment,
        }
    }
}

/// Entry of the accounts list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccount {
    pub currency: String,
    #[serde(rename = "type")]
    pub account_type: String,
    #[serde(default)]
    pub available: Option<Decimal>,
}

/// Order placement acknowledgement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrderAck {
    pub order_id: String,
}

/// Order detail payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    #[serde(default)]
    pub deal_size: Option<Decimal>,
    #[serde(default)]
    pub deal_funds: Option<Decimal>,
}

impl From<RawOrder> for OrderFill {
    fn from(raw: RawOrder) -> Self {
        Self {
            size: raw.deal_size.unwrap_or(Decimal::ZERO),
            funds: raw.deal_funds.unwrap_or(Decimal::ZERO),
        }
    }
}

/// Parses one row of the candles endpoint.
///
/// KuCoin returns string septuples `[time, open, close, high, low, volume,
/// turnover]`, newest first, with `time` in epoch seconds.
pub fn parse_candle_row(row: &[String]) -> Result<Candle> {
    fn field(row: &[String], idx: usize) -> Result<&str> {
        row.get(idx)
            .map(String::as_str)
            .ok_or_else(|| KucoinError::Serialization(format!("candle row too short at {idx}")))
    }
    fn decimal(row: &[String], idx: usize) -> Result<Decimal> {
        field(row, idx)?
            .parse::<Decimal>()
            .map_err(|e| KucoinError::Serialization(format!("bad candle field {idx}: {e}")))
    }

    let secs: i64 = field(row, 0)?
        .parse()
        .map_err(|e| KucoinError::Serialization(format!("bad candle timestamp: {e}")))?;
    let start: DateTime<Utc> = DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| KucoinError::Serialization(format!("candle timestamp out of range: {secs}")))?;

    Ok(Candle {
        start,
        open: decimal(row, 1)?,
        close: decimal(row, 2)?,
        high: decimal(row, 3)?,
        low: decimal(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn envelope_success_yields_data() {
        let env: Envelope<RawOrderAck> = serde_json::from_str(
            r#"{"code":"200000","data":{"orderId":"abc123"}}"#,
        )
        .unwrap();
        assert_eq!(env.into_data().unwrap().order_id, "abc123");
    }

    #[test]
    fn envelope_failure_maps_to_api_error() {
        let env: Envelope<RawOrderAck> =
            serde_json::from_str(r#"{"code":"400100","msg":"Order size invalid"}"#).unwrap();
        let err = env.into_data().unwrap_err();
        assert!(matches!(err, KucoinError::Api { .. }));
        assert!(err.to_string().contains("Order size invalid"));
    }

    #[test]
    fn ticker_prefers_last_price_then_bid() {
        let with_price: RawTicker =
            serde_json::from_str(r#"{"price":"1.5","bestBid":"1.4"}"#).unwrap();
        assert_eq!(with_price.preferred_price(), Some(dec!(1.5)));

        let bid_only: RawTicker = serde_json::from_str(r#"{"bestBid":"1.4"}"#).unwrap();
        assert_eq!(bid_only.preferred_price(), Some(dec!(1.4)));
    }

    #[test]
    fn symbol_meta_falls_back_for_missing_increments() {
        let raw: RawSymbol = serde_json::from_str(
            r#"{"symbol":"BTC-USDT","baseMinSize":"0.0001"}"#,
        )
        .unwrap();
        let meta = SymbolMeta::from(raw);
        assert_eq!(meta.base_increment, dec!(0.0001));
        assert_eq!(meta.quote_increment, dec!(0.0001));
    }

    #[test]
    fn candle_row_parses_strings() {
        let row: Vec<String> = ["1589739000", "0.21", "0.22", "0.23", "0.20", "100", "21.5"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let candle = parse_candle_row(&row).unwrap();
        assert_eq!(candle.close, dec!(0.22));
        assert_eq!(candle.start.timestamp(), 1_589_739_000);
    }

    #[test]
    fn short_candle_row_is_an_error() {
        let row: Vec<String> = vec!["1589739000".to_string(), "0.21".to_string()];
        assert!(parse_candle_row(&row).is_err());
    }
}
