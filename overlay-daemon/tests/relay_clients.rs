use futures_util::{SinkExt, StreamExt};
use overlay_broadcaster::{BroadcastHub, Frame};
use overlay_config::DisplayConfig;
use overlay_daemon::{ConnectionState, ControlChannelClient, UpstreamRelayClient};
use serde_json::{json, Value};
use std::sync::Arc;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);
const RECONNECT: Duration = Duration::from_millis(50);

async fn local_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<tokio::net::TcpStream> {
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    accept_async(stream).await.unwrap()
}

/// Reserve a loopback address with nothing listening on it
async fn vacant_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn accept_raw(listener: &TcpListener) -> TcpStream {
    timeout(WAIT, listener.accept()).await.unwrap().unwrap().0
}

/// Time between two connection attempts the server refuses mid-handshake
async fn retry_gap(listener: &TcpListener) -> Duration {
    drop(accept_raw(listener).await);
    let first = Instant::now();
    drop(accept_raw(listener).await);
    first.elapsed()
}

async fn wait_for_state(state: impl Fn() -> ConnectionState, expected: ConnectionState) {
    timeout(WAIT, async {
        while state() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("state never became {:?}", expected));
}

async fn subscribe(hub: &BroadcastHub) -> mpsc::UnboundedReceiver<Frame> {
    let (tx, rx) = mpsc::unbounded_channel();
    hub.register(tx).await.unwrap();
    rx
}

/// Skip frames until one of `kind` arrives
async fn next_of_type(rx: &mut mpsc::UnboundedReceiver<Frame>, kind: &str) -> Value {
    timeout(WAIT, async {
        loop {
            let frame = rx.recv().await.expect("hub channel closed");
            let value: Value = serde_json::from_str(&frame).unwrap();
            if value["type"] == kind {
                return value;
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn upstream_caption_is_relayed_verbatim() {
    let (listener, url) = local_server().await;
    let hub = Arc::new(BroadcastHub::new(DisplayConfig::default()));
    let mut rx = subscribe(&hub).await;

    let client = Arc::new(UpstreamRelayClient::new(
        format!("{}/translate", url),
        RECONNECT,
        Arc::clone(&hub),
    ));
    let shutdown = CancellationToken::new();
    let task = client.start(shutdown.clone());

    let mut server = accept(&listener).await;
    server
        .send(Message::Text(
            json!({ "type": "processing_data", "data": "Hallo" }).to_string(),
        ))
        .await
        .unwrap();

    let frame = next_of_type(&mut rx, "translation").await;
    assert_eq!(frame, json!({ "type": "translation", "data": "Hallo" }));

    shutdown.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn upstream_reconnects_after_close() {
    let (listener, url) = local_server().await;
    let hub = Arc::new(BroadcastHub::new(DisplayConfig::default()));
    let mut rx = subscribe(&hub).await;

    let client = Arc::new(UpstreamRelayClient::new(url, RECONNECT, Arc::clone(&hub)));
    let shutdown = CancellationToken::new();
    let task = client.start(shutdown.clone());

    let mut first = accept(&listener).await;
    first.close(None).await.unwrap();
    drop(first);

    let mut second = accept(&listener).await;
    second
        .send(Message::Text(
            json!({ "type": "processing_data", "translated": "Hello again" }).to_string(),
        ))
        .await
        .unwrap();

    let frame = next_of_type(&mut rx, "translation").await;
    assert_eq!(frame["data"], "Hello again");

    shutdown.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn control_settings_are_cached_and_broadcast() {
    let (listener, url) = local_server().await;
    let hub = Arc::new(BroadcastHub::new(DisplayConfig::default()));
    let mut rx = subscribe(&hub).await;

    let client = Arc::new(ControlChannelClient::new(url, RECONNECT, Arc::clone(&hub)));
    let shutdown = CancellationToken::new();
    let task = client.start(shutdown.clone());

    let mut server = accept(&listener).await;

    let status = next_of_type(&mut rx, "whispering_status").await;
    assert_eq!(status["data"]["connected"], false);
    let status = next_of_type(&mut rx, "whispering_status").await;
    assert_eq!(status["data"]["connected"], true);

    server
        .send(Message::Text(
            json!({
                "type": "whisper_languages",
                "data": { "whisper_languages": ["en", "de"], "current_language": "en" }
            })
            .to_string(),
        ))
        .await
        .unwrap();

    let settings = next_of_type(&mut rx, "whispering_settings").await;
    assert_eq!(settings["data"]["whisper_languages"]["current_language"], "en");

    // Late joiners get the cache during catch-up
    let mut late = subscribe(&hub).await;
    let cached = next_of_type(&mut late, "whispering_settings").await;
    assert_eq!(cached, settings);

    shutdown.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn control_forwards_setting_changes_while_connected() {
    let (listener, url) = local_server().await;
    let hub = Arc::new(BroadcastHub::new(DisplayConfig::default()));

    let client = Arc::new(ControlChannelClient::new(url, RECONNECT, Arc::clone(&hub)));
    assert!(!client.send_setting(&json!("current_language"), &json!("de")).await);

    let shutdown = CancellationToken::new();
    let task = client.start(shutdown.clone());
    let mut server = accept(&listener).await;

    wait_for_state(|| client.state(), ConnectionState::Connected).await;

    assert!(client.send_setting(&json!("current_language"), &json!("de")).await);

    let received = timeout(WAIT, server.next()).await.unwrap().unwrap().unwrap();
    let received: Value = serde_json::from_str(received.to_text().unwrap()).unwrap();
    assert_eq!(
        received,
        json!({ "type": "setting_change", "name": "current_language", "value": "de" })
    );

    assert!(!client.send_setting(&json!(""), &json!("de")).await);

    shutdown.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
    assert!(!client.send_setting(&json!("current_language"), &json!("fr")).await);
}

#[tokio::test]
async fn control_disconnect_is_announced() {
    let (listener, url) = local_server().await;
    let hub = Arc::new(BroadcastHub::new(DisplayConfig::default()));
    let mut rx = subscribe(&hub).await;

    let client = Arc::new(ControlChannelClient::new(url, Duration::from_secs(60), Arc::clone(&hub)));
    let shutdown = CancellationToken::new();
    let task = client.start(shutdown.clone());

    let mut server = accept(&listener).await;
    let status = next_of_type(&mut rx, "whispering_status").await;
    assert_eq!(status["data"]["connected"], false);
    let status = next_of_type(&mut rx, "whispering_status").await;
    assert_eq!(status["data"]["connected"], true);

    server
        .send(Message::Text(
            json!({ "type": "translate_settings", "data": { "current_language": "de" } })
                .to_string(),
        ))
        .await
        .unwrap();
    let settings = next_of_type(&mut rx, "whispering_settings").await;
    assert_eq!(settings["data"]["current_language"], "de");

    drop(server);

    let status = next_of_type(&mut rx, "whispering_status").await;
    assert_eq!(status["data"]["connected"], false);

    // Cached settings follow the offline status
    let frame = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    let frame: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(frame["type"], "whispering_settings");
    assert_eq!(frame["data"]["current_language"], "de");

    wait_for_state(|| client.state(), ConnectionState::Disconnected).await;

    shutdown.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn upstream_keeps_retrying_until_source_appears() {
    let delay = Duration::from_millis(100);
    let addr = vacant_addr().await;
    let hub = Arc::new(BroadcastHub::new(DisplayConfig::default()));
    let mut rx = subscribe(&hub).await;

    let client = Arc::new(UpstreamRelayClient::new(
        format!("ws://{}", addr),
        delay,
        Arc::clone(&hub),
    ));
    let shutdown = CancellationToken::new();
    let task = client.start(shutdown.clone());

    // Several refused attempts before anything listens
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_ne!(client.state(), ConnectionState::Connected);

    let listener = TcpListener::bind(addr).await.unwrap();
    assert!(retry_gap(&listener).await >= delay - Duration::from_millis(10));

    let mut server = accept(&listener).await;
    wait_for_state(|| client.state(), ConnectionState::Connected).await;

    server
        .send(Message::Text(
            json!({ "type": "processing_data", "data": "Endlich" }).to_string(),
        ))
        .await
        .unwrap();
    let frame = next_of_type(&mut rx, "translation").await;
    assert_eq!(frame["data"], "Endlich");

    shutdown.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn control_keeps_retrying_until_source_appears() {
    let delay = Duration::from_millis(100);
    let addr = vacant_addr().await;
    let hub = Arc::new(BroadcastHub::new(DisplayConfig::default()));
    let mut rx = subscribe(&hub).await;

    let client = Arc::new(ControlChannelClient::new(
        format!("ws://{}", addr),
        delay,
        Arc::clone(&hub),
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let shutdown = CancellationToken::new();
    let task = client.start(shutdown.clone());

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_ne!(client.state(), ConnectionState::Connected);

    let listener = TcpListener::bind(addr).await.unwrap();
    assert!(retry_gap(&listener).await >= delay - Duration::from_millis(10));

    // Handshake still pending on our side
    let stream = accept_raw(&listener).await;
    wait_for_state(|| client.state(), ConnectionState::Connecting).await;

    let _server = accept_async(stream).await.unwrap();
    wait_for_state(|| client.state(), ConnectionState::Connected).await;

    // Catch-up status first, then the one for this connection
    let status = next_of_type(&mut rx, "whispering_status").await;
    assert_eq!(status["data"]["connected"], false);
    let status = next_of_type(&mut rx, "whispering_status").await;
    assert_eq!(status["data"]["connected"], true);
    assert!(client.send_setting(&json!("current_language"), &json!("de")).await);

    shutdown.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
