//! Push client lifecycle tests over an in-memory connection

use async_trait::async_trait;
use poloniex_ws_sdk::{
    connection::{Connector, FrameReader, FrameWriter},
    data::*,
    directory::ChannelDirectory,
    error::*,
    PushClient,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

struct ChannelWriter(mpsc::UnboundedSender<String>);

#[async_trait]
impl FrameWriter for ChannelWriter {
    async fn write_frame(&mut self, text: String) -> Result<(), ConnectionError> {
        self.0
            .send(text)
            .map_err(|_| ConnectionError::WriteFailed("peer gone".to_string()))
    }

    async fn close(&mut self) {}
}

struct ChannelReader(mpsc::UnboundedReceiver<String>);

#[async_trait]
impl FrameReader for ChannelReader {
    async fn read_frame(&mut self) -> Result<String, ConnectionError> {
        self.0
            .recv()
            .await
            .ok_or_else(|| ConnectionError::ConnectionLost("peer closed".to_string()))
    }
}

/// Server end of one accepted connection. Dropping it breaks the connection.
struct ServerSide {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerSide {
    fn push(&self, frame: &str) {
        self.to_client.send(frame.to_string()).unwrap();
    }

    async fn next_command(&mut self) -> Value {
        let text = timeout(Duration::from_secs(2), self.from_client.recv())
            .await
            .expect("no command written")
            .expect("client writer dropped");
        serde_json::from_str(&text).unwrap()
    }

    fn assert_silent(&mut self) {
        assert!(self.from_client.try_recv().is_err());
    }
}

struct MockConnector {
    accepted: mpsc::UnboundedSender<ServerSide>,
    refuse: AtomicUsize,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<(Box<dyn FrameWriter>, Box<dyn FrameReader>), ConnectionError> {
        if self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ConnectionError::EstablishmentFailed("refused".to_string()));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        self.accepted
            .send(ServerSide { to_client, from_client })
            .map_err(|_| ConnectionError::EstablishmentFailed("server gone".to_string()))?;

        let writer: Box<dyn FrameWriter> = Box::new(ChannelWriter(client_tx));
        let reader: Box<dyn FrameReader> = Box::new(ChannelReader(client_rx));
        Ok((writer, reader))
    }
}

fn test_config() -> ClientConfig {
    ClientConfig {
        queue_capacity: 4,
        reconnect_config: ReconnectConfig {
            max_attempts: Some(5),
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        },
        ..ClientConfig::default()
    }
}

fn directory() -> ChannelDirectory {
    ChannelDirectory::from_markets([("BTC_ETH", 148), ("BTC_BCN", 7)])
}

async fn start_with(
    config: ClientConfig,
    refuse: usize,
) -> (Arc<MockConnector>, mpsc::UnboundedReceiver<ServerSide>, Result<PushClient, SdkError>) {
    let (accepted, connections) = mpsc::unbounded_channel();
    let connector = Arc::new(MockConnector {
        accepted,
        refuse: AtomicUsize::new(refuse),
    });
    let client = PushClient::with_connector(config, directory(), connector.clone()).await;
    (connector, connections, client)
}

async fn start() -> (Arc<MockConnector>, mpsc::UnboundedReceiver<ServerSide>, ServerSide, PushClient) {
    let (connector, mut connections, client) = start_with(test_config(), 0).await;
    let server = connections.recv().await.unwrap();
    (connector, connections, server, client.unwrap())
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn recv_update(queue: &poloniex_ws_sdk::DeliveryQueue) -> Option<PushUpdate> {
    timeout(Duration::from_secs(2), queue.recv()).await.expect("no update delivered")
}

#[tokio::test]
async fn test_subscribe_and_unsubscribe_commands() {
    let (_connector, _connections, mut server, client) = start().await;
    assert_eq!(client.state(), ConnectionState::Running);

    let queue = client.subscribe("btc_eth").await.unwrap();
    assert_eq!(server.next_command().await, json!({"command": "subscribe", "channel": "148"}));
    assert_eq!(client.active_channels(), vec!["BTC_ETH".to_string()]);

    client.unsubscribe("BTC_ETH").await.unwrap();
    assert_eq!(server.next_command().await, json!({"command": "unsubscribe", "channel": "148"}));
    assert!(client.active_channels().is_empty());

    let again = client.subscribe("BTC_ETH").await.unwrap();
    assert_eq!(server.next_command().await, json!({"command": "subscribe", "channel": "148"}));
    assert!(Arc::ptr_eq(&queue, &again));
    assert!(Arc::ptr_eq(&queue, &client.queue("btc_eth").unwrap()));
}

#[tokio::test]
async fn test_ticker_channel_commands() {
    let (_connector, _connections, mut server, client) = start().await;

    client.subscribe_ticker().await.unwrap();
    assert_eq!(server.next_command().await, json!({"command": "subscribe", "channel": "1002"}));

    client.unsubscribe_ticker().await.unwrap();
    assert_eq!(server.next_command().await, json!({"command": "unsubscribe", "channel": "1002"}));
}

#[tokio::test]
async fn test_unknown_channel_rejected() {
    let (_connector, _connections, mut server, client) = start().await;

    let result = client.subscribe("DOGE_BTC").await;
    assert!(matches!(
        result,
        Err(SdkError::Subscription(SubscriptionError::UnknownChannel(ref name))) if name == "DOGE_BTC"
    ));
    assert!(client.queue("DOGE_BTC").is_none());

    let result = client.unsubscribe("DOGE_BTC").await;
    assert!(matches!(result, Err(SdkError::Subscription(SubscriptionError::UnknownChannel(_)))));
    server.assert_silent();
}

#[tokio::test]
async fn test_duplicate_subscribe_policies() {
    let (_connector, _connections, mut server, client) = start().await;

    let first = client.subscribe("BTC_ETH").await.unwrap();
    server.next_command().await;
    let second = client.subscribe("BTC_ETH").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    server.assert_silent();

    let config = ClientConfig {
        strict_subscribe: true,
        ..test_config()
    };
    let (_connector, mut connections, strict) = start_with(config, 0).await;
    let _strict_server = connections.recv().await.unwrap();
    let strict = strict.unwrap();
    strict.subscribe("BTC_ETH").await.unwrap();
    assert!(matches!(
        strict.subscribe("BTC_ETH").await,
        Err(SdkError::Subscription(SubscriptionError::AlreadySubscribed(_)))
    ));
}

#[tokio::test]
async fn test_concurrent_subscribe_sees_failed_write() {
    let (connector, _connections, server, client) = start().await;
    connector.refuse.store(usize::MAX, Ordering::SeqCst);
    drop(server);

    let (first, second) = tokio::join!(client.subscribe("BTC_ETH"), client.subscribe("BTC_ETH"));
    assert!(matches!(first, Err(SdkError::Connection(_))));
    assert!(matches!(second, Err(SdkError::Connection(_))));
    assert!(client.active_channels().is_empty());
}

#[tokio::test]
async fn test_frames_routed_to_channel_queues() {
    let (_connector, _connections, mut server, client) = start().await;
    let market = client.subscribe("BTC_ETH").await.unwrap();
    let ticker = client.subscribe_ticker().await.unwrap();
    server.next_command().await;
    server.next_command().await;

    server.push("[1010]");
    server.push(r#"[7,3,[["o",1,"1.0","2.0"]]]"#);
    server.push(r#"[148,4,[["o",1,"50.0","0.00000000"],["t","12345",1,"10.0","2.5",25.0]]]"#);
    server.push(r#"[1002,null,[148,"100.5","100.4","100.6","0.01","1000","995",0,"102","99"]]"#);

    assert!(matches!(recv_update(&market).await, Some(PushUpdate::OrderBookRemove(_))));
    assert!(matches!(recv_update(&market).await, Some(PushUpdate::NewTrade(t)) if t.trade_id == 12345));
    match recv_update(&ticker).await {
        Some(PushUpdate::Ticker(t)) => assert_eq!(t.symbol, "BTC_ETH"),
        other => panic!("expected ticker, got {:?}", other),
    }
    assert!(market.is_empty());
    assert!(client.queue("BTC_BCN").is_none());
}

#[tokio::test]
async fn test_slow_consumer_does_not_stall_other_channels() {
    let (_connector, _connections, mut server, client) = start().await;
    let slow = client.subscribe("BTC_ETH").await.unwrap();
    let ticker = client.subscribe_ticker().await.unwrap();
    server.next_command().await;
    server.next_command().await;

    for id in 0..10 {
        server.push(&format!(r#"[148,{},[["t","{}",0,"1.0","1.0",1.0]]]"#, id, id));
    }
    server.push(r#"[1002,null,[148,"1","1","1","0","1","1",0,"1","1"]]"#);

    assert!(matches!(recv_update(&ticker).await, Some(PushUpdate::Ticker(_))));
    assert_eq!(slow.len(), slow.capacity());
    assert_eq!(slow.dropped(), 6);
    for id in 0..4 {
        assert!(matches!(slow.try_recv(), Some(PushUpdate::NewTrade(t)) if t.trade_id == id));
    }
}

#[tokio::test]
async fn test_reconnect_resubscribes_active_channels() {
    let (_connector, mut connections, mut server, client) = start().await;
    let queue = client.subscribe("BTC_ETH").await.unwrap();
    client.subscribe_ticker().await.unwrap();
    client.subscribe("BTC_BCN").await.unwrap();
    client.unsubscribe("BTC_BCN").await.unwrap();
    for _ in 0..4 {
        server.next_command().await;
    }

    drop(server);

    let mut server = timeout(Duration::from_secs(2), connections.recv())
        .await
        .expect("client did not reconnect")
        .unwrap();
    assert_eq!(server.next_command().await, json!({"command": "subscribe", "channel": "148"}));
    assert_eq!(server.next_command().await, json!({"command": "subscribe", "channel": "1002"}));

    wait_until(|| client.state() == ConnectionState::Running && client.reconnect_count() == 1).await;
    server.assert_silent();

    server.push(r#"[148,9,[["o",0,"2.0","3.0"]]]"#);
    assert!(matches!(recv_update(&queue).await, Some(PushUpdate::OrderBookModify(_))));
    assert!(Arc::ptr_eq(&queue, &client.queue("BTC_ETH").unwrap()));
}

#[tokio::test]
async fn test_reconnect_retries_after_refusal() {
    let (connector, mut connections, server, client) = start().await;
    connector.refuse.store(2, Ordering::SeqCst);

    drop(server);

    let _server = timeout(Duration::from_secs(2), connections.recv())
        .await
        .expect("client did not reconnect")
        .unwrap();
    wait_until(|| client.reconnect_count() == 1).await;
    assert_eq!(connector.refuse.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let config = ClientConfig {
        reconnect_config: ReconnectConfig {
            max_attempts: Some(2),
            ..test_config().reconnect_config
        },
        ..test_config()
    };
    let (connector, mut connections, client) = start_with(config, 0).await;
    let client = client.unwrap();
    let server = connections.recv().await.unwrap();
    connector.refuse.store(100, Ordering::SeqCst);

    drop(server);

    wait_until(|| client.state() == ConnectionState::Stopped).await;
    assert_eq!(client.reconnect_count(), 0);
}

#[tokio::test]
async fn test_backoff_persists_across_silent_connections() {
    let config = ClientConfig {
        reconnect_config: ReconnectConfig {
            max_attempts: Some(3),
            ..test_config().reconnect_config
        },
        ..test_config()
    };
    let (_connector, mut connections, client) = start_with(config, 0).await;
    let client = client.unwrap();
    let server = connections.recv().await.unwrap();

    // every connection is accepted and then dropped before sending anything
    tokio::spawn(async move { while connections.recv().await.is_some() {} });
    let started = tokio::time::Instant::now();
    drop(server);

    wait_until(|| client.state() == ConnectionState::Stopped).await;
    assert_eq!(client.reconnect_count(), 3);
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_backoff_resets_after_frames_received() {
    let config = ClientConfig {
        reconnect_config: ReconnectConfig {
            max_attempts: Some(2),
            ..test_config().reconnect_config
        },
        ..test_config()
    };
    let (_connector, mut connections, client) = start_with(config, 0).await;
    let client = client.unwrap();

    tokio::spawn(async move {
        while let Some(server) = connections.recv().await {
            server.push("[1010]");
        }
    });

    wait_until(|| client.reconnect_count() >= 4).await;
    assert_ne!(client.state(), ConnectionState::Stopped);
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_initial_connect_failure_is_fatal() {
    let (_connector, _connections, client) = start_with(test_config(), 1).await;
    assert!(matches!(
        client,
        Err(SdkError::Connection(ConnectionError::EstablishmentFailed(_)))
    ));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let config = ClientConfig {
        queue_capacity: 0,
        ..test_config()
    };
    let (_connector, _connections, client) = start_with(config, 0).await;
    assert!(matches!(client, Err(SdkError::Configuration(_))));
}

#[tokio::test]
async fn test_shutdown_stops_without_reconnecting() {
    let (_connector, mut connections, _server, client) = start().await;
    let queue = client.subscribe("BTC_ETH").await.unwrap();

    client.shutdown().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Stopped);
    assert!(!client.is_connected());

    assert!(matches!(
        client.subscribe("BTC_ETH").await,
        Err(SdkError::Subscription(SubscriptionError::Closed))
    ));
    assert_eq!(recv_update(&queue).await, None);

    sleep(Duration::from_millis(50)).await;
    assert!(connections.try_recv().is_err());
    assert_eq!(client.reconnect_count(), 0);
}

#[tokio::test]
async fn test_shutdown_during_backoff() {
    let (connector, _connections, server, client) = start().await;
    connector.refuse.store(usize::MAX, Ordering::SeqCst);
    let mut states = client.state_changes();

    drop(server);
    wait_until(|| client.state() == ConnectionState::Connecting).await;

    client.shutdown().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Stopped);
    assert_eq!(*states.borrow_and_update(), ConnectionState::Stopped);
}
