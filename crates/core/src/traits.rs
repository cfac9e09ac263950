//! Capability traits wiring the engine to its collaborators.
//!
//! Collaborators are injected at construction; a missing capability is a
//! configuration decision, never a runtime probe.

use crate::market::{Candle, OrderFill, SymbolMeta};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Black-box spot exchange operations consumed by the engine.
#[async_trait]
pub trait SpotExchange: Send + Sync {
    /// Last traded price for a pair.
    async fn ticker_price(&self, pair: &str) -> Result<Decimal>;

    /// Available (not held) balance of a currency in the trade account.
    async fn available_balance(&self, currency: &str) -> Result<Decimal>;

    /// Trading rules for a pair.
    async fn symbol_meta(&self, pair: &str) -> Result<SymbolMeta>;

    /// Places a market buy spending `funds` of quote currency. Returns the order id.
    async fn place_market_buy(&self, pair: &str, funds: Decimal) -> Result<String>;

    /// Places a market sell of `size` base units. Returns the order id.
    async fn place_market_sell(&self, pair: &str, size: Decimal) -> Result<String>;

    /// Executed size and funds for an order.
    async fn order_fill(&self, order_id: &str) -> Result<OrderFill>;

    /// Most recent candle for the pair at the given interval (e.g. `1hour`),
    /// or `None` when the exchange has no data for it.
    async fn latest_candle(&self, pair: &str, interval: &str) -> Result<Option<Candle>>;

    /// Exchange server clock, for skew detection.
    async fn server_time(&self) -> Result<DateTime<Utc>>;
}

/// Outbound message sink. Best-effort: implementations log failures and
/// never surface them to callers.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: String);
}

/// Admission decision for an incoming signal.
pub trait AdmissionGate: Send + Sync {
    /// Returns `true` when a signal for `symbol` (normalized form) may open
    /// a position.
    fn allows(&self, symbol: &str) -> bool;
}

/// Gate that admits every symbol.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenGate;

impl AdmissionGate for OpenGate {
    fn allows(&self, _symbol: &str) -> bool {
        true
    }
}
