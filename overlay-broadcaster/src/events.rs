use overlay_config::DisplayConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{BroadcasterError, Result};
use crate::settings::ControlSettings;

/// Serialized JSON text frame, shared between all subscribers of one broadcast
pub type Frame = Arc<str>;

/// Largest text frame accepted from a subscriber
pub const MAX_CLIENT_FRAME_BYTES: usize = 10 * 1024;

/// Messages sent to subscribers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BroadcastEvent {
    /// Translated caption text from the upstream source
    Translation(String),

    /// Full display configuration snapshot
    Config(DisplayConfig),

    /// Control source connectivity
    WhisperingStatus { connected: bool },

    /// Whole control settings cache
    WhisperingSettings(ControlSettings),

    /// Acknowledgment of one subscriber's setting change request
    WhisperingSettingResponse {
        success: bool,
        name: Value,
        value: Value,
    },
}

/// Broadcast kinds, used for per-kind bookkeeping and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Translation,
    Config,
    WhisperingStatus,
    WhisperingSettings,
    WhisperingSettingResponse,
}

impl BroadcastEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BroadcastEvent::Translation(_) => EventKind::Translation,
            BroadcastEvent::Config(_) => EventKind::Config,
            BroadcastEvent::WhisperingStatus { .. } => EventKind::WhisperingStatus,
            BroadcastEvent::WhisperingSettings(_) => EventKind::WhisperingSettings,
            BroadcastEvent::WhisperingSettingResponse { .. } => {
                EventKind::WhisperingSettingResponse
            }
        }
    }

    /// Serialize once into a frame that can be cloned to every subscriber
    pub fn to_frame(&self) -> Result<Frame> {
        let json = serde_json::to_string(self)?;
        Ok(Arc::from(json))
    }
}

/// Messages received from subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Request to change one control source setting. Fields are passed on
    /// unchecked; the control client validates them.
    WhisperingSettingChange { name: Value, value: Value },
}

impl ClientMessage {
    /// Parse a subscriber text frame.
    ///
    /// `name`/`value` may sit at the top level or inside `data`.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() > MAX_CLIENT_FRAME_BYTES {
            return Err(BroadcasterError::FrameTooLarge {
                size: text.len(),
                limit: MAX_CLIENT_FRAME_BYTES,
            });
        }

        let message: Value = serde_json::from_str(text)?;
        let message_type = message
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| BroadcasterError::InvalidMessage("missing type".to_string()))?;

        match message_type {
            "whispering_setting_change" => {
                let payload = match message.get("data") {
                    Some(data) if data.is_object() => data,
                    _ => &message,
                };
                let field = |key: &str| payload.get(key).cloned().unwrap_or(Value::Null);

                Ok(ClientMessage::WhisperingSettingChange {
                    name: field("name"),
                    value: field("value"),
                })
            }
            other => Err(BroadcasterError::UnknownMessage(other.to_string())),
        }
    }
}
