//! Cross-platform path utilities for the overlay translator.
//!
//! Single source of truth for where the daemon keeps its files.
//!
//! # Platform Behavior
//!
//! | Platform | Config Directory |
//! |----------|------------------|
//! | Linux    | `~/.config/overlay-translator` |
//! | macOS    | `~/Library/Application Support/overlay-translator` |
//! | Windows  | `%APPDATA%/overlay-translator` |
//!
//! The directory holds two files: `config.toml` (daemon settings) and
//! `overlay.json` (the shared display configuration served to subscribers).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine config directory")]
    NoConfigDirectory,

    #[error("Path has no parent directory: {0}")]
    NoParent(PathBuf),
}

/// Application identifier used in path construction.
const APP_NAME: &str = "overlay-translator";

/// Daemon settings file name.
const SETTINGS_FILE_NAME: &str = "config.toml";

/// Persisted display configuration file name.
const DISPLAY_CONFIG_FILE_NAME: &str = "overlay.json";

/// Get the configuration directory, creating it if needed.
///
/// # Errors
/// Returns an error if the platform config directory cannot be determined
/// or the application subdirectory cannot be created.
pub fn get_config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
    let config_dir = base.join(APP_NAME);
    ensure_dir(&config_dir)?;
    Ok(config_dir)
}

/// Get the path of the daemon settings file (`config.toml`).
///
/// # Errors
/// Returns an error if the config directory cannot be determined.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(SETTINGS_FILE_NAME))
}

/// Get the path of the persisted display configuration (`overlay.json`).
///
/// # Errors
/// Returns an error if the config directory cannot be determined.
pub fn get_display_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(DISPLAY_CONFIG_FILE_NAME))
}

/// Make sure the directory containing `path` exists.
///
/// # Errors
/// Returns an error if `path` has no parent or the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> Result<PathBuf> {
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => PathBuf::from("."),
        Some(p) => p.to_path_buf(),
        None => return Err(PathError::NoParent(path.to_path_buf()).into()),
    };

    ensure_dir(&parent)?;
    Ok(parent)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    // Owner-only; failure here is not fatal
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms).ok();
    }

    Ok(())
}
