//! Shared display configuration for the overlay translator
//!
//! One [`DisplayConfig`] record controls how every overlay renders captions.
//! [`ConfigStore`] owns it:
//!
//! - `update` validates each supplied field independently and merges only
//!   when all of them pass
//! - accepted records are written atomically to a JSON file
//! - listeners obtained from `subscribe` receive every accepted record
//! - edits made to the file by other processes are reloaded after a 100 ms
//!   debounce and announced the same way
//!
//! # Example Usage
//!
//! ```no_run
//! use overlay_config::ConfigStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(ConfigStore::open("/tmp/overlay.json").await);
//!     let mut updates = store.subscribe().await;
//!     store.start_watching().await?;
//!
//!     let config = store.update(&json!({ "fontSize": "32px" })).await?;
//!     assert_eq!(updates.recv().await, Some(config));
//!
//!     store.stop_watching().await;
//!     Ok(())
//! }
//! ```

pub mod display;
pub mod error;
pub mod store;
pub mod validation;

// Re-exports
pub use display::{Color, DisplayConfig, Pixels, TextAlign};
pub use error::{ConfigError, Result, ValidationErrors};
pub use store::{ConfigStore, MAX_CONFIG_FILE_BYTES, RELOAD_DEBOUNCE};
pub use validation::{validate_update, DisplayConfigPatch};
