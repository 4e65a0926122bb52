//! # Poloniex WebSocket SDK
//!
//! Client for the Poloniex push API with a rate-limited REST client alongside.
//!
//! The push client resolves market names to channel ids once at startup, keeps a
//! single WebSocket connection open, and routes decoded ticker, order book and
//! trade updates into one bounded queue per subscribed channel. Lost connections
//! are re-established and active channels resubscribed automatically.
//!
//! ## Quick Start
//! ```rust,ignore
//! use poloniex_ws_sdk::prelude::*;
//!
//! let client = PushClient::connect(ClientConfig::default()).await?;
//! let queue = client.subscribe("BTC_ETH").await?;
//! while let Some(update) = queue.recv().await {
//!     println!("{}", update);
//! }
//! ```

pub mod auth;
pub mod client;
pub mod connection;
pub mod data;
pub mod decoder;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod market;
pub mod rate_limit;
pub mod rest_client;
pub mod subscription;
pub mod trading;
pub mod transport;

pub use client::{ClientConfigBuilder, PushClient};
pub use connection::{Connector, FrameReader, FrameWriter, ReconnectStrategy, WebSocketConnector};
pub use data::*;
pub use decoder::{DecodedFrame, FrameDecoder};
pub use directory::{ChannelDirectory, TICKER_CHANNEL_ID, TICKER_CHANNEL_NAME};
pub use error::*;
pub use rest_client::PoloniexRestClient;
pub use subscription::{DeliveryQueue, SubscriptionCommand, SubscriptionRegistry};

/// Prelude - minimal public API surface
///
/// Import with: `use poloniex_ws_sdk::prelude::*;`
pub mod prelude {
    /// Push client
    pub use crate::client::{ClientConfigBuilder, PushClient};
    pub use crate::subscription::DeliveryQueue;

    /// Configuration
    pub use crate::data::{ClientConfig, ReconnectConfig};

    /// Decoded updates
    pub use crate::data::{
        BookSide, NewTrade, OrderBookModify, OrderBookRemove, OrderDepthSnapshot, PushUpdate,
        TickerUpdate, TradeSide,
    };

    /// REST
    pub use crate::auth::Credentials;
    pub use crate::rest_client::PoloniexRestClient;

    /// Errors
    pub use crate::error::SdkError;

    /// Connection state
    pub use crate::data::ConnectionState;
}

/// Initialize logging for the SDK.
///
/// Honours `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
