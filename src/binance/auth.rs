//! Request signing for the Binance REST API
//!
//! Signed endpoints carry `timestamp` and `recvWindow` in the query string and
//! an HMAC-SHA256 of that query string, hex encoded, as `signature`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `payload` keyed by `secret`, hex encoded
pub fn sign(payload: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// API key and secret
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Append `timestamp`, `recvWindow` and `signature` to `query`
    pub fn signed_query(&self, query: &str, timestamp_ms: i64, recv_window_ms: u64) -> String {
        let mut payload = String::from(query);
        if !payload.is_empty() {
            payload.push('&');
        }
        payload.push_str(&format!(
            "recvWindow={}&timestamp={}",
            recv_window_ms, timestamp_ms
        ));
        let signature = sign(&payload, &self.api_secret);
        format!("{}&signature={}", payload, signature)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .finish()
    }
}
