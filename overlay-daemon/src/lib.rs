//! Overlay translator relay daemon
//!
//! Relays captions from an upstream translation source to every connected
//! overlay, serves the shared display configuration over HTTP and bridges
//! setting changes to the control source.

pub mod config;
pub mod context;
pub mod control;
pub mod http;
pub mod network;
pub mod subscriber;
pub mod upstream;
pub mod ws;

pub use config::DaemonConfig;
pub use context::{AppContext, ServerInfo};
pub use control::{ControlChannelClient, SettingError};
pub use network::{bind_with_retry, select_address, BindError};
pub use upstream::UpstreamRelayClient;
pub use ws::ConnectionState;
