use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub kucoin: KucoinConfig,
    /// Telegram notification settings; absent means notifications are disabled.
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KucoinConfig {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
    #[serde(default = "default_kucoin_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

fn default_kucoin_url() -> String {
    "https://api.kucoin.com".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_requests_per_minute() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
}

/// Parameters of the capital ladder and the per-position monitors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Capital committed on track 1, in quote currency.
    #[serde(default = "default_base_amount")]
    pub base_amount: Decimal,
    /// Per-track geometric growth, percent (track k = base * (1+g)^(k-1)).
    #[serde(default = "default_growth_pct")]
    pub growth_pct: Decimal,
    #[serde(default = "default_max_tracks")]
    pub max_tracks: u32,
    /// Maximum simultaneously open positions.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Realized gain at or above this percent classifies a close as profitable.
    #[serde(default = "default_profit_threshold_pct")]
    pub profit_threshold_pct: Decimal,
    /// Retrace from the post-arm peak that triggers the trailing sell, percent.
    #[serde(default = "default_retrace_pct")]
    pub retrace_pct: Decimal,
    /// Drop from fill price that lands a position in the hourly drawdown report.
    #[serde(default = "default_drawdown_alert_pct")]
    pub drawdown_alert_pct: Decimal,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    /// Poll interval once trailing is armed.
    #[serde(default = "default_armed_poll_secs")]
    pub armed_poll_secs: u64,
    /// Give up on an unfilled position after this long without a price.
    #[serde(default = "default_price_timeout_secs")]
    pub price_timeout_secs: u64,
    #[serde(default = "default_sweep_secs")]
    pub sweep_secs: u64,
    /// Warn when local clock and exchange clock diverge by more than this.
    #[serde(default = "default_clock_skew_warn_secs")]
    pub clock_skew_warn_secs: i64,
}

fn default_base_amount() -> Decimal {
    Decimal::from(50)
}

fn default_growth_pct() -> Decimal {
    Decimal::TWO
}

const fn default_max_tracks() -> u32 {
    10
}

const fn default_capacity() -> usize {
    10
}

fn default_profit_threshold_pct() -> Decimal {
    Decimal::TWO
}

fn default_retrace_pct() -> Decimal {
    Decimal::ONE
}

fn default_drawdown_alert_pct() -> Decimal {
    Decimal::from(4)
}

fn default_quote_currency() -> String {
    "USDT".to_string()
}

const fn default_poll_secs() -> u64 {
    60
}

const fn default_armed_poll_secs() -> u64 {
    10
}

const fn default_price_timeout_secs() -> u64 {
    600
}

const fn default_sweep_secs() -> u64 {
    3600
}

const fn default_clock_skew_warn_secs() -> i64 {
    5
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            base_amount: default_base_amount(),
            growth_pct: default_growth_pct(),
            max_tracks: default_max_tracks(),
            capacity: default_capacity(),
            profit_threshold_pct: default_profit_threshold_pct(),
            retrace_pct: default_retrace_pct(),
            drawdown_alert_pct: default_drawdown_alert_pct(),
            quote_currency: default_quote_currency(),
            poll_secs: default_poll_secs(),
            armed_poll_secs: default_armed_poll_secs(),
            price_timeout_secs: default_price_timeout_secs(),
            sweep_secs: default_sweep_secs(),
            clock_skew_warn_secs: default_clock_skew_warn_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    /// Optional symbol blacklist file; absent means every symbol is admitted.
    #[serde(default)]
    pub blacklist_path: Option<PathBuf>,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/state.json")
}

fn default_history_path() -> PathBuf {
    PathBuf::from("data/history.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            history_path: default_history_path(),
            blacklist_path: None,
        }
    }
}
