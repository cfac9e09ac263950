//! KuCoin API v2 request signing.
//!
//! Each authenticated request carries an HMAC-SHA256 signature over
//! `timestamp + method + path(+query) + body`, base64-encoded, plus the
//! passphrase itself HMAC-signed under the same secret.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{KucoinError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Headers attached to an authenticated KuCoin request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    /// `KC-API-SIGN` value.
    pub signature: String,
    /// `KC-API-TIMESTAMP` value (milliseconds).
    pub timestamp: String,
    /// `KC-API-PASSPHRASE` value (v2: HMAC-signed).
    pub passphrase: String,
}

/// API credentials for signing.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    api_secret: String,
    api_passphrase: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Creates credentials, rejecting empty fields up front.
    ///
    /// # Errors
    /// Returns `KucoinError::Credentials` when any field is empty.
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        api_passphrase: impl Into<String>,
    ) -> Result<Self> {
        let creds = Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            api_passphrase: api_passphrase.into(),
        };
        if creds.api_key.is_empty() || creds.api_secret.is_empty() || creds.api_passphrase.is_empty()
        {
            return Err(KucoinError::Credentials(
                "api_key, api_secret and api_passphrase must all be set".to_string(),
            ));
        }
        Ok(creds)
    }

    /// Signs one request.
    ///
    /// `path` must include the query string when present; `body` is the raw
    /// JSON payload or empty for GET requests.
    ///
    /// # Errors
    /// Returns `KucoinError::Credentials` if HMAC initialization fails.
    pub fn sign(
        &self,
        timestamp_ms: i64,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<SignedHeaders> {
        let timestamp = timestamp_ms.to_string();
        let payload = format!("{timestamp}{method}{path}{body}");

        Ok(SignedHeaders {
            signature: self.hmac_base64(payload.as_bytes())?,
            passphrase: self.hmac_base64(self.api_passphrase.as_bytes())?,
            timestamp,
        })
    }

    fn hmac_base64(&self, message: &[u8]) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| KucoinError::Credentials(format!("HMAC init failed: {e}")))?;
        mac.update(message);
        Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
    }
}
