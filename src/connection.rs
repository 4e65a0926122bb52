//! WebSocket connection establishment and reconnect backoff

use crate::{
    data::{ConnectionConfig, ReconnectConfig},
    error::ConnectionError,
};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a push connection
#[async_trait]
pub trait FrameWriter: Send {
    async fn write_frame(&mut self, text: String) -> Result<(), ConnectionError>;

    /// Best-effort close handshake
    async fn close(&mut self);
}

/// Read half of a push connection
#[async_trait]
pub trait FrameReader: Send {
    /// Next text frame. Control frames are consumed internally; a closed or
    /// failed connection is an error.
    async fn read_frame(&mut self) -> Result<String, ConnectionError>;
}

/// Opens a fresh duplex connection to the push endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<(Box<dyn FrameWriter>, Box<dyn FrameReader>), ConnectionError>;
}

/// Production connector over `tokio-tungstenite`
pub struct WebSocketConnector {
    config: ConnectionConfig,
}

impl WebSocketConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<(Box<dyn FrameWriter>, Box<dyn FrameReader>), ConnectionError> {
        let url = Url::parse(&self.config.endpoint)
            .map_err(|e| ConnectionError::EstablishmentFailed(format!("Invalid URL: {}", e)))?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectionError::EstablishmentFailed(format!("Invalid request: {}", e)))?;
        let origin = HeaderValue::from_str(&self.config.origin)
            .map_err(|e| ConnectionError::EstablishmentFailed(format!("Invalid origin: {}", e)))?;
        request.headers_mut().insert("Origin", origin);

        let connect_future = connect_async(request);
        let timeout_future = sleep(self.config.timeout);

        tokio::select! {
            result = connect_future => {
                match result {
                    Ok((ws_stream, _)) => {
                        tracing::info!("WebSocket connection established to {}", self.config.endpoint);
                        let (sink, stream) = ws_stream.split();
                        let writer: Box<dyn FrameWriter> = Box::new(WsWriter { sink });
                        let reader: Box<dyn FrameReader> = Box::new(WsReader { stream });
                        Ok((writer, reader))
                    }
                    Err(e) => Err(ConnectionError::EstablishmentFailed(format!("Connection failed: {}", e))),
                }
            }
            _ = timeout_future => {
                Err(ConnectionError::Timeout("Connection timeout".to_string()))
            }
        }
    }
}

struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn write_frame(&mut self, text: String) -> Result<(), ConnectionError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| ConnectionError::WriteFailed(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::debug!("Close handshake failed: {}", e);
        }
    }
}

struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn read_frame(&mut self) -> Result<String, ConnectionError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(String::from_utf8_lossy(&data).into_owned());
                }
                // pongs are queued by tungstenite itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                    continue;
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(ConnectionError::ConnectionLost(format!("closed by server: {:?}", frame)));
                }
                Some(Err(e)) => return Err(ConnectionError::ReadFailed(e.to_string())),
                None => return Err(ConnectionError::ConnectionLost("stream ended".to_string())),
            }
        }
    }
}

/// Reconnection strategy with exponential backoff and jitter.
///
/// The first attempt is immediate, and again after [`ReconnectStrategy::reset`].
#[derive(Debug)]
pub struct ReconnectStrategy {
    config: ReconnectConfig,
    attempts: u32,
    current_delay: Duration,
}

impl ReconnectStrategy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` when attempts are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_attempts {
            if self.attempts >= max {
                return None;
            }
        }

        self.attempts += 1;
        if self.attempts == 1 {
            return Some(Duration::ZERO);
        }

        let delay = self.current_delay;
        let next_delay_ms = (self.current_delay.as_millis() as f64 * self.config.backoff_multiplier) as u64;
        self.current_delay = std::cmp::min(Duration::from_millis(next_delay_ms), self.config.max_delay);

        Some(self.jittered(delay))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_delay = self.config.initial_delay;
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return delay;
        }
        let base = delay.as_millis() as f64;
        let range = base * self.config.jitter_factor;
        let jitter = rand::thread_rng().gen_range(-range..=range);
        Duration::from_millis((base + jitter).max(0.0) as u64)
    }
}
