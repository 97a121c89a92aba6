//! Upstream translation feed
//!
//! Keeps a connection to the translation source open and relays every
//! `processing_data` caption to the hub. On close or error it waits a fixed
//! delay and reconnects, forever.

use anyhow::Result;
use overlay_broadcaster::BroadcastHub;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ws::{self, ConnectionState, WsMessage};

/// Message type carrying caption text
pub const TRANSLATION_EVENT_TYPE: &str = "processing_data";

pub struct UpstreamRelayClient {
    url: String,
    reconnect_delay: Duration,
    hub: Arc<BroadcastHub>,
    state: watch::Sender<ConnectionState>,
}

impl UpstreamRelayClient {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration, hub: Arc<BroadcastHub>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: url.into(),
            reconnect_delay,
            hub,
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Spawn the reconnect loop; it ends when `shutdown` is cancelled
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move { client.run(shutdown).await })
    }

    async fn run(&self, shutdown: CancellationToken) {
        loop {
            self.state.send_replace(ConnectionState::Connecting);

            match self.connect_and_process(&shutdown).await {
                Ok(()) => info!("Upstream connection closed"),
                Err(e) => warn!("Upstream connection error: {:#}", e),
            }
            self.state.send_replace(ConnectionState::Disconnected);

            if shutdown.is_cancelled() {
                break;
            }

            info!(
                "Reconnecting to upstream in {} seconds...",
                self.reconnect_delay.as_secs_f32()
            );
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        debug!("Upstream relay stopped");
    }

    async fn connect_and_process(&self, shutdown: &CancellationToken) -> Result<()> {
        let (mut writer, mut reader) = tokio::select! {
            result = ws::connect(&self.url) => result?,
            _ = shutdown.cancelled() => return Ok(()),
        };

        info!("✓ Connected to upstream {}", self.url);
        self.state.send_replace(ConnectionState::Connected);

        loop {
            let message = tokio::select! {
                message = reader.recv() => message,
                _ = shutdown.cancelled() => {
                    let _ = writer.close().await;
                    return Ok(());
                }
            };

            match message {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(caption) = self.extract(&text) {
                        debug!("Received translation: {}", caption);
                        self.hub.broadcast_translation(caption).await;
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => writer.send_pong(data).await?,
                Some(Ok(WsMessage::Close { code, reason })) => {
                    debug!("Upstream sent close ({}): {}", code, reason);
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            }
        }
    }

    fn extract(&self, text: &str) -> Option<String> {
        match extract_translation(text) {
            Ok(caption) => caption,
            Err(e) => {
                warn!("Ignoring malformed upstream message: {}", e);
                None
            }
        }
    }
}

/// Pull caption text out of an upstream message.
///
/// Only `processing_data` messages carry captions. `translated` is preferred,
/// `data` is the fallback; blank text yields `None`. The text is returned
/// as received, without trimming.
pub fn extract_translation(text: &str) -> serde_json::Result<Option<String>> {
    let message: Value = serde_json::from_str(text)?;

    if message.get("type").and_then(Value::as_str) != Some(TRANSLATION_EVENT_TYPE) {
        return Ok(None);
    }

    let non_blank = |key: &str| {
        message
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    Ok(non_blank("translated").or_else(|| non_blank("data")))
}
