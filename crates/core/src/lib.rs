pub mod config;
pub mod config_loader;
pub mod market;
pub mod symbol;
pub mod traits;

pub use config::{AppConfig, KucoinConfig, StorageConfig, TelegramConfig, TradingConfig};
pub use config_loader::ConfigLoader;
pub use market::{Candle, OrderFill, SymbolMeta};
pub use symbol::{format_pair, normalize_symbol, quantize_down};
pub use traits::{AdmissionGate, Notifier, OpenGate, SpotExchange};
