//! Authentication utilities for the Poloniex trading API
//!
//! Trading requests carry the API key in a `Key` header and a `Sign` header holding
//! the hex-encoded HMAC-SHA512 of the form body, keyed with the API secret.

use crate::error::SdkError;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha512 = Hmac<Sha512>;

/// Credentials for authenticated API access
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: &str, api_secret: &str) -> Result<Self, SdkError> {
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(SdkError::Authentication(
                "Set the API key and API secret".to_string(),
            ));
        }

        Ok(Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Sign an URL-encoded form body, returning the value for the `Sign` header
    pub fn sign(&self, form_data: &str) -> Result<String, SdkError> {
        let mut mac = HmacSha512::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| SdkError::Authentication(format!("HMAC error: {}", e)))?;
        mac.update(form_data.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &format!("{}...", &self.api_key.chars().take(8).collect::<String>()))
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Strictly increasing nonce source (microseconds since epoch, bumped on collision).
///
/// The exchange rejects any nonce not greater than the previous one for the key.
#[derive(Debug, Default)]
pub struct NonceGenerator {
    last: AtomicU64,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(current) => last = current,
            }
        }
    }
}
