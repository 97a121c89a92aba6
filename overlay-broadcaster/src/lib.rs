//! Fan-out hub for overlay translator subscribers
//!
//! Every connected overlay or config page is a subscriber. The hub delivers
//! three streams to all of them: translated captions from the upstream source,
//! display config snapshots, and control source status/settings.
//!
//! # Features
//!
//! - JSON text frames tagged with `type`, payload under `data`
//! - One serialization per broadcast, the same frame shared by every subscriber
//! - Closed subscribers are dropped during send, no retry or queuing
//! - New subscriber catch-up (config, control status, cached settings)
//! - Per-kind FIFO: subscribers see a kind in the order the hub was asked
//!
//! # Event Types
//!
//! - `translation` - caption text
//! - `config` - full display configuration
//! - `whispering_status` - `{connected}` for the control source
//! - `whispering_settings` - control settings cache
//! - `whispering_setting_response` - `{success, name, value}` for one request
//!
//! # Example Usage
//!
//! ```no_run
//! use overlay_broadcaster::BroadcastHub;
//! use overlay_config::DisplayConfig;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = BroadcastHub::new(DisplayConfig::default());
//!
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let id = hub.register(tx).await?;
//!
//!     hub.broadcast_translation("Hallo").await;
//!
//!     // config, whispering_status, then the caption
//!     for _ in 0..3 {
//!         println!("{}", rx.recv().await.unwrap());
//!     }
//!
//!     hub.unregister(id).await;
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod client;
pub mod error;
pub mod events;
pub mod settings;

// Re-exports
pub use broadcaster::BroadcastHub;
pub use client::{SubscriberChannel, SubscriberId};
pub use error::{BroadcasterError, Result};
pub use events::{BroadcastEvent, ClientMessage, EventKind, Frame, MAX_CLIENT_FRAME_BYTES};
pub use settings::{ControlSettings, SettingsCategory};
