//! Process-wide state shared by the HTTP handlers and background tasks

use overlay_broadcaster::BroadcastHub;
use overlay_config::ConfigStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DaemonConfig;
use crate::control::ControlChannelClient;
use crate::upstream::UpstreamRelayClient;

/// Addresses advertised by `GET /api/server-info`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerInfo {
    pub port: u16,
    #[serde(rename = "localIP")]
    pub local_ip: String,
    pub urls: ServerUrls,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerUrls {
    pub live: String,
    pub config: String,
    pub live_localhost: String,
    pub config_localhost: String,
}

impl ServerInfo {
    pub fn new(local_ip: impl Into<String>, port: u16) -> Self {
        let local_ip = local_ip.into();
        Self {
            port,
            urls: ServerUrls {
                live: format!("http://{}:{}/live", local_ip, port),
                config: format!("http://{}:{}/config", local_ip, port),
                live_localhost: format!("http://localhost:{}/live", port),
                config_localhost: format!("http://localhost:{}/config", port),
            },
            local_ip,
        }
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub config_store: Arc<ConfigStore>,
    pub hub: Arc<BroadcastHub>,
    pub upstream: Arc<UpstreamRelayClient>,
    pub control: Arc<ControlChannelClient>,
    pub server_info: Arc<ServerInfo>,
    pub shutdown: CancellationToken,
}

impl AppContext {
    /// Open the display config store and wire the hub and both clients to it.
    /// Nothing is started yet.
    pub async fn new(config: &DaemonConfig, server_info: ServerInfo) -> Self {
        let config_store = Arc::new(ConfigStore::open(config.display_config_path.clone()).await);
        let hub = Arc::new(BroadcastHub::new(config_store.get().await));

        let upstream = Arc::new(UpstreamRelayClient::new(
            config.upstream_url.clone(),
            config.reconnect_delay(),
            Arc::clone(&hub),
        ));
        let control = Arc::new(ControlChannelClient::new(
            config.control_url.clone(),
            config.reconnect_delay(),
            Arc::clone(&hub),
        ));

        Self {
            config_store,
            hub,
            upstream,
            control,
            server_info: Arc::new(server_info),
            shutdown: CancellationToken::new(),
        }
    }

    /// Broadcast every record the store accepts, from the API or the watcher
    pub async fn spawn_config_forwarder(&self) -> JoinHandle<()> {
        let mut updates = self.config_store.subscribe().await;
        let hub = Arc::clone(&self.hub);

        tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                hub.broadcast_config(config).await;
            }
            debug!("Config forwarder stopped");
        })
    }
}
