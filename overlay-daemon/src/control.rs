//! Control/settings channel
//!
//! A second outbound connection, to the source that owns translator settings.
//! Settings it advertises are cached and re-broadcast whole to subscribers;
//! setting changes requested by subscribers are forwarded while connected and
//! refused otherwise.

use anyhow::Result;
use overlay_broadcaster::{BroadcastHub, ControlSettings, SettingsCategory};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ws::{self, ConnectionState, WsMessage};

pub const MAX_SETTING_NAME_LEN: usize = 100;
pub const MAX_SETTING_VALUE_LEN: usize = 1000;

/// Message type used when forwarding a setting change
pub const SETTING_CHANGE_TYPE: &str = "setting_change";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettingError {
    #[error("setting name must be a non-empty string of at most {MAX_SETTING_NAME_LEN} characters")]
    InvalidName,

    #[error("setting value must be a number or a string of at most {MAX_SETTING_VALUE_LEN} characters")]
    InvalidValue,

    #[error("control source is not connected")]
    NotConnected,
}

/// Check a requested setting change before it leaves the process
pub fn validate_setting(name: &Value, value: &Value) -> Result<String, SettingError> {
    let name = name
        .as_str()
        .filter(|n| !n.is_empty() && n.chars().count() <= MAX_SETTING_NAME_LEN)
        .ok_or(SettingError::InvalidName)?;

    match value {
        Value::Number(_) => {}
        Value::String(s) if s.chars().count() <= MAX_SETTING_VALUE_LEN => {}
        _ => return Err(SettingError::InvalidValue),
    }

    Ok(name.to_string())
}

pub struct ControlChannelClient {
    url: String,
    reconnect_delay: Duration,
    hub: Arc<BroadcastHub>,
    state: watch::Sender<ConnectionState>,
    settings: Mutex<ControlSettings>,
    /// Present only while a connection is open
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl ControlChannelClient {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration, hub: Arc<BroadcastHub>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: url.into(),
            reconnect_delay,
            hub,
            state,
            settings: Mutex::new(ControlSettings::default()),
            outbound: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Forward a setting change to the control source.
    ///
    /// Returns false when the request is invalid or the connection is not
    /// open; nothing is queued for later.
    pub async fn send_setting(&self, name: &Value, value: &Value) -> bool {
        match self.try_send_setting(name, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Setting change {} rejected: {}", name, e);
                false
            }
        }
    }

    async fn try_send_setting(&self, name: &Value, value: &Value) -> Result<(), SettingError> {
        let name = validate_setting(name, value)?;

        let outbound = self.outbound.lock().await;
        let tx = outbound.as_ref().ok_or(SettingError::NotConnected)?;

        let message = json!({
            "type": SETTING_CHANGE_TYPE,
            "name": name,
            "value": value,
        });
        tx.send(message.to_string())
            .map_err(|_| SettingError::NotConnected)?;

        info!("Forwarded setting change {} = {}", name, value);
        Ok(())
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
                Ok(()) => info!("Control connection closed"),
                Err(e) => warn!("Control connection error: {:#}", e),
            }
            self.state.send_replace(ConnectionState::Disconnected);

            if shutdown.is_cancelled() {
                break;
            }

            info!(
                "Reconnecting to control source in {} seconds...",
                self.reconnect_delay.as_secs_f32()
            );
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        debug!("Control channel stopped");
    }

    async fn connect_and_process(&self, shutdown: &CancellationToken) -> Result<()> {
        let (mut writer, mut reader) = tokio::select! {
            result = ws::connect(&self.url) => result?,
            _ = shutdown.cancelled() => return Ok(()),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *self.outbound.lock().await = Some(tx);

        info!("✓ Connected to control source {}", self.url);
        self.state.send_replace(ConnectionState::Connected);
        self.announce(true).await;

        let result = self
            .process(&mut writer, &mut reader, &mut rx, shutdown)
            .await;

        // Refuse new requests before telling subscribers we are offline
        self.outbound.lock().await.take();
        if shutdown.is_cancelled() {
            let _ = writer.close().await;
        }
        self.announce(false).await;

        result
    }

    async fn process(
        &self,
        writer: &mut ws::WsWriter,
        reader: &mut ws::WsReader,
        outbound: &mut mpsc::UnboundedReceiver<String>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),

                Some(request) = outbound.recv() => writer.send_text(&request).await?,

                message = reader.recv() => match message {
                    Some(Ok(WsMessage::Text(text))) => self.handle_message(&text).await,
                    Some(Ok(WsMessage::Ping(data))) => writer.send_pong(data).await?,
                    Some(Ok(WsMessage::Close { code, reason })) => {
                        debug!("Control source sent close ({}): {}", code, reason);
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
            }
        }
    }

    /// Broadcast connectivity, plus the cache when it holds anything
    async fn announce(&self, connected: bool) {
        self.hub.broadcast_control_status(connected).await;

        let settings = self.settings.lock().await.clone();
        if !settings.is_empty() {
            self.hub.broadcast_control_settings(settings).await;
        }
    }

    async fn handle_message(&self, text: &str) {
        let message: Value = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed control message: {}", e);
                return;
            }
        };

        let Some(message_type) = message.get("type").and_then(Value::as_str) else {
            debug!("Control message without type ignored");
            return;
        };

        let Some(category) = SettingsCategory::from_message_type(message_type) else {
            debug!("Control message {} ignored", message_type);
            return;
        };

        let data = message.get("data").cloned().unwrap_or(Value::Null);

        let snapshot = {
            let mut settings = self.settings.lock().await;
            if !settings.apply(category, data) {
                warn!("Control message {} has an unexpected payload", message_type);
                return;
            }
            settings.clone()
        };

        debug!("Control settings updated ({:?})", category);
        self.hub.broadcast_control_settings(snapshot).await;
    }
}
