//! Channel name ↔ numeric id resolution
//!
//! The push API addresses every market by a small integer. The mapping comes from the
//! `id` field of the public ticker listing and is fixed for the lifetime of a client.

use crate::error::{DirectoryError, SdkError};
use crate::market::Ticker;
use crate::rest_client::PoloniexRestClient;
use std::collections::HashMap;

/// Reserved channel id of the aggregate ticker feed
pub const TICKER_CHANNEL_ID: u64 = 1002;

/// Directory name of the aggregate ticker feed
pub const TICKER_CHANNEL_NAME: &str = "TICKER";

/// Immutable market name ↔ channel id table
#[derive(Debug, Clone)]
pub struct ChannelDirectory {
    by_name: HashMap<String, u64>,
    by_id: HashMap<u64, String>,
}

impl ChannelDirectory {
    /// Build the directory from `(market name, channel id)` pairs.
    ///
    /// The ticker channel is always registered. Names are stored uppercase.
    pub fn from_markets<I, S>(markets: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: AsRef<str>,
    {
        let mut by_name = HashMap::new();
        let mut by_id = HashMap::new();

        for (name, id) in markets {
            let name = name.as_ref().to_uppercase();
            by_id.insert(id, name.clone());
            by_name.insert(name, id);
        }

        by_name.insert(TICKER_CHANNEL_NAME.to_string(), TICKER_CHANNEL_ID);
        by_id.insert(TICKER_CHANNEL_ID, TICKER_CHANNEL_NAME.to_string());

        Self { by_name, by_id }
    }

    /// Build the directory from a `returnTicker` listing
    pub fn from_tickers(tickers: &HashMap<String, Ticker>) -> Self {
        Self::from_markets(tickers.iter().map(|(name, ticker)| (name.as_str(), ticker.id)))
    }

    /// Fetch the ticker listing and build the directory. Any failure is fatal.
    pub async fn fetch(rest: &PoloniexRestClient) -> Result<Self, DirectoryError> {
        let tickers = rest.get_tickers().await.map_err(|e| match e {
            SdkError::Server(msg) => DirectoryError::Malformed(msg),
            other => DirectoryError::Fetch(other.to_string()),
        })?;

        if tickers.is_empty() {
            return Err(DirectoryError::Malformed("empty ticker listing".to_string()));
        }

        let directory = Self::from_tickers(&tickers);
        tracing::info!("Channel directory built with {} markets", directory.market_count());
        Ok(directory)
    }

    /// Channel id for a name, case-insensitive
    pub fn resolve(&self, name: &str) -> Option<u64> {
        self.by_name.get(&name.to_uppercase()).copied()
    }

    /// Name registered for a channel id
    pub fn name_of(&self, id: u64) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn market_count(&self) -> usize {
        self.by_id.len().saturating_sub(1)
    }

    pub fn markets(&self) -> impl Iterator<Item = (&str, u64)> {
        self.by_name
            .iter()
            .filter(|(_, id)| **id != TICKER_CHANNEL_ID)
            .map(|(name, id)| (name.as_str(), *id))
    }
}
