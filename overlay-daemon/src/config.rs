//! Daemon settings
//!
//! Loaded from `config.toml` in the platform config directory. Unlike the
//! display config these settings are read once at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that switches on production logging
pub const ENV_MODE_VAR: &str = "OVERLAY_ENV";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path this config was loaded from
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Preferred HTTP/WebSocket port
    pub port: u16,

    /// How many successive ports to try when the preferred one is taken
    pub max_port_retries: u32,

    /// Interface address to listen on
    pub bind_address: String,

    /// Translation event source
    pub upstream_url: String,

    /// Control/settings source
    pub control_url: String,

    /// Fixed delay between reconnect attempts (seconds)
    pub reconnect_delay_secs: u64,

    /// Persisted display configuration
    pub display_config_path: PathBuf,

    /// Only warnings and errors are logged
    pub production: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: overlay_paths::get_settings_path()
                .unwrap_or_else(|_| PathBuf::from("config.toml")),
            port: 3000,
            max_port_retries: 10,
            bind_address: "0.0.0.0".to_string(),
            upstream_url: "ws://127.0.0.1:5000/translate".to_string(),
            control_url: "ws://127.0.0.1:5000".to_string(),
            reconnect_delay_secs: 5,
            display_config_path: overlay_paths::get_display_config_path()
                .unwrap_or_else(|_| PathBuf::from("overlay.json")),
            production: false,
        }
    }
}

impl DaemonConfig {
    /// Load settings from `path` (or the default location), creating the file
    /// with defaults when it does not exist
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => overlay_paths::get_settings_path()
                .context("Failed to determine settings path")?,
        };

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read settings file")?;

            toml::from_str::<DaemonConfig>(&contents).context("Failed to parse settings file")?
        } else {
            let config = Self {
                config_path: config_path.clone(),
                ..Self::default()
            };
            config.save().context("Failed to save default settings")?;
            config
        };

        config.config_path = config_path;
        if production_from_env() {
            config.production = true;
        }

        Ok(config)
    }

    /// Save settings to `config_path`
    pub fn save(&self) -> Result<()> {
        overlay_paths::ensure_parent_dir(&self.config_path)?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize settings")?;

        std::fs::write(&self.config_path, contents).context("Failed to write settings file")?;

        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

fn production_from_env() -> bool {
    std::env::var(ENV_MODE_VAR)
        .map(|v| v.eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}
