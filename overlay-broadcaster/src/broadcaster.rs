use overlay_config::DisplayConfig;
use tokio::sync::Mutex;

use crate::client::{SubscriberChannel, SubscriberId, SubscriberRegistry};
use crate::error::Result;
use crate::events::BroadcastEvent;
use crate::settings::ControlSettings;

/// Fan-out hub for overlay subscribers.
///
/// Besides the registry the hub keeps the latest config snapshot, control
/// status and settings cache so a joining subscriber can be caught up. All of
/// it sits behind one lock, which makes a join atomic with respect to
/// broadcasts and keeps every kind in call order.
pub struct BroadcastHub {
    state: Mutex<HubState>,
}

struct HubState {
    registry: SubscriberRegistry,
    config: DisplayConfig,
    control_connected: bool,
    settings: ControlSettings,
}

impl BroadcastHub {
    pub fn new(config: DisplayConfig) -> Self {
        Self {
            state: Mutex::new(HubState {
                registry: SubscriberRegistry::new(),
                config,
                control_connected: false,
                settings: ControlSettings::default(),
            }),
        }
    }

    /// Add a subscriber after sending it the catch-up messages
    pub async fn register(&self, channel: SubscriberChannel) -> Result<SubscriberId> {
        let mut state = self.state.lock().await;
        let subscriber = state.registry.prepare(channel);
        let id = subscriber.id();

        subscriber.send_catch_up(&state.config, state.control_connected, &state.settings)?;

        state.registry.insert(subscriber);
        tracing::info!("Subscriber {} connected. Total: {}", id, state.registry.len());

        Ok(id)
    }

    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.registry.remove(id);
        if removed {
            tracing::info!(
                "Subscriber {} disconnected. Remaining: {}",
                id,
                state.registry.len()
            );
        }
        removed
    }

    /// Send `event` to every open subscriber.
    ///
    /// Snapshot kinds (config, status, settings) also replace the cached value
    /// used for catch-up. Returns the number of subscribers reached.
    pub async fn broadcast(&self, event: BroadcastEvent) -> Result<usize> {
        let frame = event.to_frame()?;
        let kind = event.kind();

        let mut state = self.state.lock().await;
        match event {
            BroadcastEvent::Config(config) => state.config = config,
            BroadcastEvent::WhisperingStatus { connected } => state.control_connected = connected,
            BroadcastEvent::WhisperingSettings(settings) => state.settings = settings,
            BroadcastEvent::Translation(_) | BroadcastEvent::WhisperingSettingResponse { .. } => {}
        }

        let delivered = state.registry.send_all(&frame);
        tracing::debug!("Broadcast {:?} to {} subscriber(s)", kind, delivered);

        Ok(delivered)
    }

    pub async fn broadcast_translation(&self, text: impl Into<String>) {
        if let Err(e) = self.broadcast(BroadcastEvent::Translation(text.into())).await {
            tracing::error!("Failed to broadcast translation: {}", e);
        }
    }

    pub async fn broadcast_config(&self, config: DisplayConfig) {
        if let Err(e) = self.broadcast(BroadcastEvent::Config(config)).await {
            tracing::error!("Failed to broadcast config: {}", e);
        }
    }

    pub async fn broadcast_control_status(&self, connected: bool) {
        if let Err(e) = self
            .broadcast(BroadcastEvent::WhisperingStatus { connected })
            .await
        {
            tracing::error!("Failed to broadcast control status: {}", e);
        }
    }

    pub async fn broadcast_control_settings(&self, settings: ControlSettings) {
        if let Err(e) = self
            .broadcast(BroadcastEvent::WhisperingSettings(settings))
            .await
        {
            tracing::error!("Failed to broadcast control settings: {}", e);
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.lock().await.registry.len()
    }

    /// Drop every subscriber channel; their connection tasks then close
    pub async fn close_all(&self) {
        let mut state = self.state.lock().await;
        if state.registry.is_empty() {
            return;
        }
        let count = state.registry.len();
        state.registry.clear();
        tracing::info!("Closed {} subscriber channel(s)", count);
    }
}
