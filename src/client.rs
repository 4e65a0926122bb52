//! Push client for the Poloniex WebSocket API

use crate::{
    connection::{Connector, ReconnectStrategy, WebSocketConnector},
    data::*,
    decoder::FrameDecoder,
    directory::{ChannelDirectory, TICKER_CHANNEL_NAME},
    dispatch::{run_dispatch_loop, DispatchExit},
    error::{ConnectionError, ErrorReporter, SdkError, SubscriptionError},
    rest_client::PoloniexRestClient,
    subscription::{DeliveryQueue, SubscriptionCommand, SubscriptionRegistry},
    transport::Transport,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// Client for the push channel.
///
/// One background task reads the connection and routes decoded updates to
/// per-channel queues; it reconnects on transport failure until shut down.
pub struct PushClient {
    inner: Arc<Inner>,
    shutdown_tx: mpsc::Sender<()>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    state_rx: watch::Receiver<ConnectionState>,
}

struct Inner {
    config: ClientConfig,
    directory: Arc<ChannelDirectory>,
    transport: Transport,
    decoder: FrameDecoder,
    registry: SubscriptionRegistry,
    /// Held from registry update until the command is written
    commands: Mutex<()>,
    shutting_down: AtomicBool,
    reconnects: AtomicU64,
    state_tx: watch::Sender<ConnectionState>,
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!("Connection state {:?} -> {:?}", previous, state);
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

impl PushClient {
    /// Fetch the channel directory over REST, then open the push connection.
    ///
    /// Directory and initial connect failures are returned to the caller.
    pub async fn connect(config: ClientConfig) -> Result<Self, SdkError> {
        let rest = PoloniexRestClient::new(&config)?;
        let directory = ChannelDirectory::fetch(&rest).await?;
        let connector = WebSocketConnector::new(ConnectionConfig::from(&config));

        Self::with_connector(config, directory, Arc::new(connector)).await
    }

    /// Open the push connection with a prepared directory and connector
    pub async fn with_connector(
        config: ClientConfig,
        directory: ChannelDirectory,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SdkError> {
        config.validate().map_err(SdkError::Configuration)?;
        let directory = Arc::new(directory);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let inner = Arc::new(Inner {
            decoder: FrameDecoder::new(directory.clone()),
            registry: SubscriptionRegistry::new(config.queue_capacity),
            commands: Mutex::new(()),
            transport: Transport::new(connector),
            directory,
            config,
            shutting_down: AtomicBool::new(false),
            reconnects: AtomicU64::new(0),
            state_tx,
        });

        tracing::info!("Connecting to {}", inner.config.push_endpoint);
        if let Err(e) = inner.transport.connect().await {
            inner.set_state(ConnectionState::Stopped);
            let error = SdkError::from(e);
            ErrorReporter::report_error(&error, "connect");
            return Err(error);
        }
        inner.set_state(ConnectionState::Running);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let supervisor = tokio::spawn(supervise(inner.clone(), shutdown_rx));

        Ok(Self {
            inner,
            shutdown_tx,
            supervisor: Mutex::new(Some(supervisor)),
            state_rx,
        })
    }

    /// Subscribe to a market channel by name and return its delivery queue.
    ///
    /// An already active channel returns its existing queue without a new
    /// command, unless strict subscribe mode is configured.
    pub async fn subscribe(&self, name: &str) -> Result<Arc<DeliveryQueue>, SdkError> {
        self.ensure_open()?;
        let (name, id) = self.resolve(name)?;

        let _commands = self.inner.commands.lock().await;
        let (queue, was_active) = self.inner.registry.activate(&name, id);
        if was_active {
            if self.inner.config.strict_subscribe {
                return Err(SubscriptionError::AlreadySubscribed(name).into());
            }
            tracing::debug!("Already subscribed to {}", name);
            return Ok(queue);
        }

        if let Err(e) = self.send_command(SubscriptionCommand::subscribe(id)).await {
            self.inner.registry.deactivate(&name);
            return Err(e);
        }

        tracing::info!("Subscribed to {} (channel {})", name, id);
        Ok(queue)
    }

    /// Unsubscribe from a channel. Its queue is kept for a later resubscribe.
    pub async fn unsubscribe(&self, name: &str) -> Result<(), SdkError> {
        self.ensure_open()?;
        let (name, id) = self.resolve(name)?;

        let _commands = self.inner.commands.lock().await;
        if !self.inner.registry.deactivate(&name) {
            tracing::debug!("Not subscribed to {}", name);
            return Ok(());
        }

        self.send_command(SubscriptionCommand::unsubscribe(id)).await?;
        tracing::info!("Unsubscribed from {} (channel {})", name, id);
        Ok(())
    }

    pub async fn subscribe_ticker(&self) -> Result<Arc<DeliveryQueue>, SdkError> {
        self.subscribe(TICKER_CHANNEL_NAME).await
    }

    pub async fn unsubscribe_ticker(&self) -> Result<(), SdkError> {
        self.unsubscribe(TICKER_CHANNEL_NAME).await
    }

    /// Delivery queue of a channel that has been subscribed at least once
    pub fn queue(&self, name: &str) -> Option<Arc<DeliveryQueue>> {
        self.inner.registry.get(&name.to_uppercase())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch dispatch state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Number of successful reconnects since construction
    pub fn reconnect_count(&self) -> u64 {
        self.inner.reconnects.load(Ordering::SeqCst)
    }

    /// Names of the currently active channels, sorted
    pub fn active_channels(&self) -> Vec<String> {
        self.inner
            .registry
            .active_channels()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    pub fn directory(&self) -> &ChannelDirectory {
        &self.inner.directory
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    /// Stop the dispatch loop, close the connection and wait for `Stopped`.
    ///
    /// Queues are closed; consumers drain what is left and then see the end.
    pub async fn shutdown(&self) -> Result<(), SdkError> {
        if !self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::info!("Shutting down push client");
        }
        let _ = self.shutdown_tx.try_send(());
        self.inner.transport.close().await;

        let handle = self.supervisor.lock().await.take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| SdkError::Connection(ConnectionError::ConnectionLost(e.to_string())))?;
        }

        self.inner.registry.close_all();
        self.inner.set_state(ConnectionState::Stopped);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SdkError> {
        if self.inner.is_shutting_down() {
            return Err(SubscriptionError::Closed.into());
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<(String, u64), SdkError> {
        let name = name.to_uppercase();
        match self.inner.directory.resolve(&name) {
            Some(id) => Ok((name, id)),
            None => Err(SubscriptionError::UnknownChannel(name).into()),
        }
    }

    async fn send_command(&self, command: SubscriptionCommand) -> Result<(), SdkError> {
        send_command(&self.inner, command).await
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.try_send(());
    }
}

impl std::fmt::Debug for PushClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushClient")
            .field("endpoint", &self.inner.config.push_endpoint)
            .field("state", &self.state())
            .field("active_channels", &self.active_channels())
            .finish()
    }
}

async fn send_command(inner: &Inner, command: SubscriptionCommand) -> Result<(), SdkError> {
    let text = command
        .to_json()
        .map_err(|e| SdkError::InvalidArgument(format!("Failed to serialize command: {}", e)))?;
    inner.transport.write(text).await?;
    Ok(())
}

/// Reconnect supervisor: runs the dispatch loop and restores the connection
/// after every transport failure until shutdown.
///
/// Backoff carries over between failures and only resets once a connection
/// has delivered at least one frame.
async fn supervise(inner: Arc<Inner>, mut shutdown_rx: mpsc::Receiver<()>) {
    let mut strategy = ReconnectStrategy::new(inner.config.reconnect_config.clone());

    loop {
        let exit = run_dispatch_loop(&inner.transport, &inner.decoder, &inner.registry, &mut shutdown_rx).await;

        match exit {
            DispatchExit::Shutdown => break,
            DispatchExit::Failed { error, frames_read } => {
                if inner.is_shutting_down() {
                    break;
                }
                inner.set_state(ConnectionState::Failed);
                ErrorReporter::report_error(&SdkError::Connection(error), "dispatch");

                if frames_read > 0 {
                    strategy.reset();
                }
                if !reconnect(&inner, &mut strategy, &mut shutdown_rx).await {
                    break;
                }
            }
        }
    }

    inner.transport.close().await;
    inner.registry.close_all();
    inner.set_state(ConnectionState::Stopped);
    tracing::info!("Push client stopped");
}

/// Returns false when the client should stop instead
async fn reconnect(
    inner: &Inner,
    strategy: &mut ReconnectStrategy,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> bool {
    loop {
        if inner.is_shutting_down() {
            return false;
        }

        let delay = match strategy.next_delay() {
            Some(delay) => delay,
            None => {
                tracing::error!("Giving up after {} reconnect attempts", strategy.attempts());
                return false;
            }
        };

        inner.set_state(ConnectionState::Connecting);
        if !delay.is_zero() {
            tracing::info!("Reconnecting in {:?}", delay);
            tokio::select! {
                _ = shutdown_rx.recv() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::warn!("Reconnect attempt {}", strategy.attempts());
        let result = tokio::select! {
            _ = shutdown_rx.recv() => return false,
            result = inner.transport.connect() => result,
        };

        match result {
            Ok(()) => {
                if inner.is_shutting_down() {
                    return false;
                }
                let count = inner.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::info!("Reconnected (reconnect #{})", count);
                resubscribe(inner).await;
                inner.set_state(ConnectionState::Running);
                return true;
            }
            Err(e) => {
                tracing::warn!("Reconnect attempt {} failed: {}", strategy.attempts(), e);
            }
        }
    }
}

/// Reissue a subscribe command for every active channel. Queues are untouched.
async fn resubscribe(inner: &Inner) {
    let _commands = inner.commands.lock().await;
    for (name, id) in inner.registry.active_channels() {
        match send_command(inner, SubscriptionCommand::subscribe(id)).await {
            Ok(()) => tracing::info!("Resubscribed to {} (channel {})", name, id),
            // the next read fails too and triggers another reconnect
            Err(e) => tracing::warn!("Resubscribe to {} failed: {}", name, e),
        }
    }
}

/// Builder pattern for client configuration
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn push_endpoint(mut self, endpoint: &str) -> Self {
        self.config.push_endpoint = endpoint.to_string();
        self
    }

    pub fn origin(mut self, origin: &str) -> Self {
        self.config.origin = origin.to_string();
        self
    }

    pub fn public_endpoint(mut self, endpoint: &str) -> Self {
        self.config.public_endpoint = endpoint.to_string();
        self
    }

    pub fn trading_endpoint(mut self, endpoint: &str) -> Self {
        self.config.trading_endpoint = endpoint.to_string();
        self
    }

    pub fn api_credentials(mut self, api_key: &str, api_secret: &str) -> Self {
        self.config.api_key = Some(api_key.to_string());
        self.config.api_secret = Some(api_secret.to_string());
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn requests_per_second(mut self, rate: u32) -> Self {
        self.config.requests_per_second = rate;
        self
    }

    pub fn strict_subscribe(mut self, strict: bool) -> Self {
        self.config.strict_subscribe = strict;
        self
    }

    pub fn reconnect_config(mut self, reconnect_config: ReconnectConfig) -> Self {
        self.config.reconnect_config = reconnect_config;
        self
    }

    pub fn build(self) -> Result<ClientConfig, SdkError> {
        self.config.validate().map_err(SdkError::Configuration)?;
        Ok(self.config)
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
