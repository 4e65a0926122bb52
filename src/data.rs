//! Data models for push updates and client configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default delivery queue capacity per channel
pub const DEFAULT_QUEUE_CAPACITY: usize = 24;

/// Wire literal that marks an order book level as removed
pub const REMOVED_AMOUNT: &str = "0.00000000";

/// Ticker snapshot from the aggregate ticker channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickerUpdate {
    pub symbol: String,
    pub last: f64,
    pub lowest_ask: f64,
    pub highest_bid: f64,
    pub percent_change: f64,
    pub base_volume: f64,
    pub quote_volume: f64,
    pub is_frozen: bool,
    pub high_24hr: f64,
    pub low_24hr: f64,
}

impl fmt::Display for TickerUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ticker[{}]: last={}, ask={}, bid={}, change={}, frozen={}",
            self.symbol, self.last, self.lowest_ask, self.highest_bid, self.percent_change, self.is_frozen
        )
    }
}

/// Side of an order book level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

impl BookSide {
    /// Wire flag: 1 is a bid, anything else an ask
    pub fn from_flag(flag: f64) -> Self {
        if flag == 1.0 {
            BookSide::Bid
        } else {
            BookSide::Ask
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookSide::Bid => "bid",
            BookSide::Ask => "ask",
        }
    }
}

/// Aggressor side of a trade
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Wire flag: 1 is a buy, anything else a sell
    pub fn from_flag(flag: f64) -> Self {
        if flag == 1.0 {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

/// A level was added or its amount changed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderBookModify {
    pub side: BookSide,
    pub rate: f64,
    pub amount: f64,
}

/// A level was removed from the book
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderBookRemove {
    pub side: BookSide,
    pub rate: f64,
}

/// A trade printed on the market
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTrade {
    pub trade_id: i64,
    pub side: TradeSide,
    pub rate: f64,
    pub amount: f64,
    pub total: f64,
}

impl fmt::Display for NewTrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trade[{}]: {} {} @ {} (total {})",
            self.trade_id, self.side.as_str(), self.amount, self.rate, self.total
        )
    }
}

/// Price level in a depth snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

impl fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.quantity, self.price)
    }
}

/// Full book sent once when a market channel is first subscribed.
///
/// Asks are sorted ascending by price, bids descending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderDepthSnapshot {
    pub symbol: String,
    pub asks: Vec<PriceLevel>,
    pub bids: Vec<PriceLevel>,
}

impl fmt::Display for OrderDepthSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Depth[{}]: {} asks, {} bids",
            self.symbol,
            self.asks.len(),
            self.bids.len()
        )
    }
}

/// One decoded update delivered to a channel's queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum PushUpdate {
    Ticker(TickerUpdate),
    OrderBookModify(OrderBookModify),
    OrderBookRemove(OrderBookRemove),
    NewTrade(NewTrade),
    OrderDepth(OrderDepthSnapshot),
}

impl fmt::Display for PushUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushUpdate::Ticker(t) => t.fmt(f),
            PushUpdate::OrderBookModify(m) => {
                write!(f, "Modify[{}]: {}@{}", m.side.as_str(), m.amount, m.rate)
            }
            PushUpdate::OrderBookRemove(r) => write!(f, "Remove[{}]: {}", r.side.as_str(), r.rate),
            PushUpdate::NewTrade(t) => t.fmt(f),
            PushUpdate::OrderDepth(d) => d.fmt(f),
        }
    }
}

/// State of the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Running,
    Failed,
    Stopped,
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub push_endpoint: String,
    pub origin: String,
    pub public_endpoint: String,
    pub trading_endpoint: String,
    pub queue_capacity: usize,
    pub timeout: Duration,
    pub request_timeout: Duration,
    pub requests_per_second: u32,
    /// Reject a subscribe on an already active channel instead of reusing it
    pub strict_subscribe: bool,
    pub reconnect_config: ReconnectConfig,
}

impl ClientConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.push_endpoint.is_empty() {
            return Err("Push endpoint cannot be empty".to_string());
        }

        if !self.push_endpoint.starts_with("ws://") && !self.push_endpoint.starts_with("wss://") {
            return Err("Push endpoint must be a valid WebSocket URL".to_string());
        }

        if !self.public_endpoint.starts_with("http://") && !self.public_endpoint.starts_with("https://") {
            return Err("Public endpoint must be an HTTP URL".to_string());
        }

        if !self.trading_endpoint.starts_with("http://") && !self.trading_endpoint.starts_with("https://") {
            return Err("Trading endpoint must be an HTTP URL".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("Queue capacity must be greater than 0".to_string());
        }

        if self.timeout.is_zero() || self.request_timeout.is_zero() {
            return Err("Timeouts must be greater than 0".to_string());
        }

        if self.requests_per_second == 0 {
            return Err("Request rate must be greater than 0".to_string());
        }

        self.reconnect_config.validate()?;

        Ok(())
    }

    /// Load configuration from the environment, falling back to defaults.
    ///
    /// A `.env` file in the working directory is honoured.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(url) = std::env::var("POLONIEX_PUSH_URL") {
            config.push_endpoint = url;
        }
        if let Ok(url) = std::env::var("POLONIEX_PUBLIC_URL") {
            config.public_endpoint = url;
        }
        if let Ok(url) = std::env::var("POLONIEX_TRADING_URL") {
            config.trading_endpoint = url;
        }
        if let Ok(key) = std::env::var("POLONIEX_API_KEY") {
            config.api_key = Some(key);
        }
        if let Ok(secret) = std::env::var("POLONIEX_API_SECRET") {
            config.api_secret = Some(secret);
        }
        if let Ok(capacity) = std::env::var("POLONIEX_QUEUE_CAPACITY") {
            config.queue_capacity = capacity
                .parse()
                .map_err(|e| format!("Invalid POLONIEX_QUEUE_CAPACITY: {}", e))?;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            push_endpoint: "wss://api2.poloniex.com".to_string(),
            origin: "https://api2.poloniex.com".to_string(),
            public_endpoint: "https://poloniex.com/public".to_string(),
            trading_endpoint: "https://poloniex.com/tradingApi".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            requests_per_second: 6,
            strict_subscribe: false,
            reconnect_config: ReconnectConfig::default(),
        }
    }
}

/// Reconnection configuration
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// `None` retries forever
    pub max_attempts: Option<u32>,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of the delay randomised in either direction (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl ReconnectConfig {
    /// Validate reconnection configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == Some(0) {
            return Err("Max attempts must be greater than 0".to_string());
        }

        if self.initial_delay.is_zero() {
            return Err("Initial delay must be greater than 0".to_string());
        }

        if self.max_delay < self.initial_delay {
            return Err("Max delay must be greater than or equal to initial delay".to_string());
        }

        if self.backoff_multiplier < 1.0 {
            return Err("Backoff multiplier must be at least 1.0".to_string());
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err("Jitter factor must be between 0.0 and 1.0".to_string());
        }

        Ok(())
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub origin: String,
    pub timeout: Duration,
}

impl From<&ClientConfig> for ConnectionConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            endpoint: config.push_endpoint.clone(),
            origin: config.origin.clone(),
            timeout: config.timeout,
        }
    }
}
