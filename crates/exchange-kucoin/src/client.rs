//! KuCoin REST API client with rate limiting.
//!
//! Provides typed access to the spot endpoints the engine consumes, with
//! automatic rate limiting (governor) and v2 HMAC authentication.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use parking_lot::RwLock;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use tracktrade_core::config::KucoinConfig;
use tracktrade_core::market::{Candle, OrderFill, SymbolMeta};
use tracktrade_core::traits::SpotExchange;

use crate::error::{KucoinError, Result};
use crate::sign::Credentials;
use crate::types::{
    parse_candle_row, Envelope, RawAccount, RawOrder, RawOrderAck, RawSymbol, RawTicker,
};

/// KuCoin production API base URL.
pub const KUCOIN_PROD_URL: &str = "https://api.kucoin.com";

/// Configuration for the KuCoin client.
#[derive(Debug, Clone)]
pub struct KucoinClientConfig {
    /// Base URL for the API.
    pub base_url: String,
    /// Requests per minute limit.
    pub requests_per_minute: NonZeroU32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for KucoinClientConfig {
    fn default() -> Self {
        Self {
            base_url: KUCOIN_PROD_URL.to_string(),
            requests_per_minute: nonzero!(100u32),
            timeout_secs: 30,
        }
    }
}

impl KucoinClientConfig {
    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self
    }
}

/// KuCoin REST API client.
///
/// All requests are rate-limited; account and order endpoints are signed.
pub struct KucoinClient {
    config: KucoinClientConfig,
    http: Client,
    credentials: Credentials,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
    /// Trading-rule cache; symbol metadata is effectively static per session.
    meta_cache: RwLock<HashMap<String, SymbolMeta>>,
}

impl std::fmt::Debug for KucoinClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KucoinClient")
            .field("base_url", &self.config.base_url)
            .field("requests_per_minute", &self.config.requests_per_minute)
            .finish_non_exhaustive()
    }
}

impl KucoinClient {
    /// Creates a new client with the given configuration and credentials.
    ///
    /// # Errors
    /// Returns an error if credentials are incomplete or the HTTP client
    /// cannot be built.
    pub fn new(config: KucoinClientConfig, credentials: Credentials) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KucoinError::Network(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_minute(config.requests_per_minute);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            config,
            http,
            credentials,
            rate_limiter,
            meta_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Creates a client from the application config section.
    ///
    /// # Errors
    /// Returns an error if credentials are incomplete.
    pub fn from_config(cfg: &KucoinConfig) -> Result<Self> {
        let credentials = Credentials::new(
            cfg.api_key.clone(),
            cfg.api_secret.clone(),
            cfg.api_passphrase.clone(),
        )?;
        let config = KucoinClientConfig {
            base_url: cfg.base_url.clone(),
            requests_per_minute: NonZeroU32::new(cfg.requests_per_minute)
                .unwrap_or(nonzero!(100u32)),
            timeout_secs: cfg.timeout_secs,
        };
        Self::new(config, credentials)
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Rejects pair strings that could escape the URL path.
    fn validate_pair(pair: &str) -> Result<&str> {
        if pair.is_empty()
            || pair.len() > 32
            || !pair
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(KucoinError::symbol_not_found(pair));
        }
        Ok(pair)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, signed: bool) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{endpoint}", self.config.base_url);
        let mut request = self.http.get(&url);
        if signed {
            let headers = self
                .credentials
                .sign(Utc::now().timestamp_millis(), "GET", endpoint, "")?;
            request = request
                .header("KC-API-KEY", &self.credentials.api_key)
                .header("KC-API-SIGN", headers.signature)
                .header("KC-API-TIMESTAMP", headers.timestamp)
                .header("KC-API-PASSPHRASE", headers.passphrase)
                .header("KC-API-KEY-VERSION", "2");
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(KucoinError::api(status.as_u16().to_string(), body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let body = payload.to_string();
        let headers = self
            .credentials
            .sign(Utc::now().timestamp_millis(), "POST", endpoint, &body)?;

        let url = format!("{}{endpoint}", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .header("KC-API-KEY", &self.credentials.api_key)
            .header("KC-API-SIGN", headers.signature)
            .header("KC-API-TIMESTAMP", headers.timestamp)
            .header("KC-API-PASSPHRASE", headers.passphrase)
            .header("KC-API-KEY-VERSION", "2")
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(KucoinError::api(status.as_u16().to_string(), text));
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Last traded price for a pair.
    ///
    /// # Errors
    /// Returns `SymbolNotFound` when the exchange reports no ticker.
    pub async fn get_ticker_price(&self, pair: &str) -> Result<Decimal> {
        let pair = Self::validate_pair(pair)?;
        let endpoint = format!("/api/v1/market/orderbook/level1?symbol={pair}");
        let envelope: Envelope<RawTicker> = self.get(&endpoint, false).await?;
        if envelope.code != crate::types::SUCCESS_CODE {
            return Err(KucoinError::api(
                envelope.code,
                envelope.msg.unwrap_or_default(),
            ));
        }
        envelope
            .data
            .and_then(|t| t.preferred_price())
            .ok_or_else(|| KucoinError::symbol_not_found(pair))
    }

    /// Trading rules for a pair, cached after the first symbol-list fetch.
    ///
    /// # Errors
    /// Returns `SymbolNotFound` when the pair is not listed.
    pub async fn get_symbol_meta(&self, pair: &str) -> Result<SymbolMeta> {
        let pair = Self::validate_pair(pair)?;
        if let Some(meta) = self.meta_cache.read().get(pair) {
            return Ok(meta.clone());
        }

        let envelope: Envelope<Vec<RawSymbol>> = self.get("/api/v2/symbols", false).await?;
        let symbols = envelope.into_data()?;
        debug!(count = symbols.len(), "refreshed symbol metadata");

        let mut cache = self.meta_cache.write();
        for raw in symbols {
            let meta = SymbolMeta::from(raw);
            cache.insert(meta.pair.clone(), meta);
        }
        cache
            .get(pair)
            .cloned()
            .ok_or_else(|| KucoinError::symbol_not_found(pair))
    }

    /// Available balance of a currency across trade accounts.
    pub async fn get_available_balance(&self, currency: &str) -> Result<Decimal> {
        let endpoint = format!("/api/v1/accounts?currency={currency}&type=trade");
        let envelope: Envelope<Vec<RawAccount>> = self.get(&endpoint, true).await?;
        let accounts = envelope.into_data()?;
        Ok(accounts
            .iter()
            .filter(|a| a.currency.eq_ignore_ascii_case(currency))
            .filter_map(|a| a.available)
            .sum())
    }

    async fn place_market_order(
        &self,
        pair: &str,
        side: &str,
        size: Option<Decimal>,
        funds: Option<Decimal>,
    ) -> Result<String> {
        let pair = Self::validate_pair(pair)?;
        let mut payload = serde_json::json!({
            "clientOid": Uuid::new_v4().to_string(),
            "symbol": pair,
            "side": side,
            "type": "market",
        });
        if let Some(size) = size {
            payload["size"] = serde_json::Value::String(size.to_string());
        }
        if let Some(funds) = funds {
            payload["funds"] = serde_json::Value::String(funds.to_string());
        }

        let envelope: Envelope<RawOrderAck> = self.post("/api/v1/orders", &payload).await?;
        match envelope.into_data() {
            Ok(ack) => {
                debug!(pair, side, order_id = %ack.order_id, "market order placed");
                Ok(ack.order_id)
            }
            Err(KucoinError::Api { code, message }) => {
                Err(KucoinError::OrderRejected(format!("{code}: {message}")))
            }
            Err(e) => Err(e),
        }
    }

    /// Executed size and funds for an order.
    pub async fn get_order_fill(&self, order_id: &str) -> Result<OrderFill> {
        if order_id.is_empty() || !order_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(KucoinError::order_not_found(order_id));
        }
        let endpoint = format!("/api/v1/orders/{order_id}");
        let envelope: Envelope<RawOrder> = self.get(&endpoint, true).await?;
        match envelope.into_data() {
            Ok(raw) => Ok(raw.into()),
            Err(KucoinError::Api { code, .. }) if code == "400100" || code == "404" => {
                Err(KucoinError::order_not_found(order_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Most recent *completed* candle for the pair, or `None` when the
    /// exchange has no history yet.
    ///
    /// The newest row KuCoin returns is usually still forming; rows whose
    /// interval has not elapsed are skipped.
    pub async fn get_latest_candle(&self, pair: &str, interval: &str) -> Result<Option<Candle>> {
        let pair = Self::validate_pair(pair)?;
        let duration = interval_duration(interval).ok_or_else(|| {
            KucoinError::Serialization(format!("unsupported candle interval: {interval}"))
        })?;

        let endpoint = format!("/api/v1/market/candles?type={interval}&symbol={pair}");
        let envelope: Envelope<Vec<Vec<String>>> = self.get(&endpoint, false).await?;
        let rows = match envelope.into_data() {
            Ok(rows) => rows,
            Err(KucoinError::Serialization(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let now = Utc::now();
        for row in rows.iter().take(3) {
            let candle = parse_candle_row(row)?;
            if candle.end(duration) <= now {
                return Ok(Some(candle));
            }
        }
        Ok(None)
    }

    /// Exchange server clock.
    pub async fn get_server_time(&self) -> Result<DateTime<Utc>> {
        let envelope: Envelope<i64> = self.get("/api/v1/timestamp", false).await?;
        let millis = envelope.into_data()?;
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| KucoinError::Serialization(format!("bad server time: {millis}")))
    }
}

/// Maps a KuCoin candle type to its duration.
fn interval_duration(interval: &str) -> Option<ChronoDuration> {
    match interval {
        "1min" => Some(ChronoDuration::minutes(1)),
        "5min" => Some(ChronoDuration::minutes(5)),
        "15min" => Some(ChronoDuration::minutes(15)),
        "30min" => Some(ChronoDuration::minutes(30)),
        "1hour" => Some(ChronoDuration::hours(1)),
        "4hour" => Some(ChronoDuration::hours(4)),
        "1day" => Some(ChronoDuration::days(1)),
        _ => None,
    }
}

#[async_trait]
impl SpotExchange for KucoinClient {
    async fn ticker_price(&self, pair: &str) -> AnyResult<Decimal> {
        Ok(self.get_ticker_price(pair).await?)
    }

    async fn available_balance(&self, currency: &str) -> AnyResult<Decimal> {
        Ok(self.get_available_balance(currency).await?)
    }

    async fn symbol_meta(&self, pair: &str) -> AnyResult<SymbolMeta> {
        Ok(self.get_symbol_meta(pair).await?)
    }

    async fn place_market_buy(&self, pair: &str, funds: Decimal) -> AnyResult<String> {
        Ok(self.place_market_order(pair, "buy", None, Some(funds)).await?)
    }

    async fn place_market_sell(&self, pair: &str, size: Decimal) -> AnyResult<String> {
        Ok(self.place_market_order(pair, "sell", Some(size), None).await?)
    }

    async fn order_fill(&self, order_id: &str) -> AnyResult<OrderFill> {
        Ok(self.get_order_fill(order_id).await?)
    }

    async fn latest_candle(&self, pair: &str, interval: &str) -> AnyResult<Option<Candle>> {
        Ok(self.get_latest_candle(pair, interval).await?)
    }

    async fn server_time(&self) -> AnyResult<DateTime<Utc>> {
        Ok(self.get_server_time().await?)
    }
}
