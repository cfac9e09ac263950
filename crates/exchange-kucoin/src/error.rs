//! Error types for KuCoin exchange integration.

use thiserror::Error;

/// Errors that can occur when interacting with KuCoin.
#[derive(Debug, Error)]
pub enum KucoinError {
    /// API request returned a non-success envelope or HTTP status.
    #[error("API error: {code} - {message}")]
    Api {
        /// KuCoin business code or HTTP status.
        code: String,
        /// Error message from the API.
        message: String,
    },

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Response body could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Credentials missing or malformed.
    #[error("credential error: {0}")]
    Credentials(String),

    /// Pair not listed on the exchange.
    #[error("symbol not found: {pair}")]
    SymbolNotFound {
        /// The pair that was not found.
        pair: String,
    },

    /// Order rejected by the exchange.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Order not found.
    #[error("order not found: {order_id}")]
    OrderNotFound {
        /// The order id that was not found.
        order_id: String,
    },
}

impl KucoinError {
    /// Creates an API error from a business code and message.
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a symbol-not-found error.
    pub fn symbol_not_found(pair: impl Into<String>) -> Self {
        Self::SymbolNotFound { pair: pair.into() }
    }

    /// Creates an order-not-found error.
    pub fn order_not_found(order_id: impl Into<String>) -> Self {
        Self::OrderNotFound {
            order_id: order_id.into(),
        }
    }

    /// Returns true if the failure is likely to clear on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { code, .. } => code
                .parse::<u16>()
                .map(|status| status >= 500)
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for KucoinError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for KucoinError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for KuCoin operations.
pub type Result<T> = std::result::Result<T, KucoinError>;
