//! Owner of the single display configuration record
//!
//! Updates are validated, merged, written atomically and then announced to
//! every listener. External edits of the backing file are picked up by a
//! debounced watcher and announced the same way.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::display::DisplayConfig;
use crate::error::{ConfigError, Result};
use crate::validation::{validate_fields, validate_update};

/// Files larger than this are never parsed
pub const MAX_CONFIG_FILE_BYTES: u64 = 100 * 1024;

/// Quiet period after the last change signal before the file is re-read
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<DisplayConfig>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<DisplayConfig>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl ConfigStore {
    /// Load the record from `path`, falling back to defaults when the file is
    /// missing, oversized or malformed. A missing file is created with defaults.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let current = match load_from_file(&path).await {
            Ok(config) => {
                info!("Display config loaded from {:?}", path);
                config
            }
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No display config at {:?}, writing defaults", path);
                let defaults = DisplayConfig::default();
                if let Err(e) = persist(&path, &defaults).await {
                    warn!("Failed to write default display config: {}", e);
                }
                defaults
            }
            Err(e) => {
                warn!("Ignoring display config: {}. Using defaults", e);
                DisplayConfig::default()
            }
        };

        Self {
            path,
            current: RwLock::new(current),
            listeners: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record
    pub async fn get(&self) -> DisplayConfig {
        self.current.read().await.clone()
    }

    /// Validate `partial` and merge the accepted fields into the record.
    ///
    /// Nothing changes when any field fails. An update with no recognised
    /// field returns the current record untouched. If the write fails the
    /// in-memory record keeps the merged value and `ConfigError::Persist` is
    /// returned; listeners are not notified in that case.
    pub async fn update(&self, partial: &Value) -> Result<DisplayConfig> {
        let patch = validate_update(partial)?;

        let mut current = self.current.write().await;
        if patch.is_empty() {
            debug!("Config update carried no known fields");
            return Ok(current.clone());
        }

        let mut next = current.clone();
        patch.apply_to(&mut next);
        *current = next.clone();

        if let Err(e) = persist(&self.path, &next).await {
            warn!("Display config changed in memory but not on disk: {}", e);
            return Err(e);
        }

        info!("Display config updated ({} field(s))", patch.len());
        self.notify(&next).await;

        Ok(next)
    }

    /// Re-read the backing file. Returns whether the record changed.
    ///
    /// An unreadable or invalid file leaves the current record in place.
    pub async fn reload(&self) -> Result<bool> {
        let loaded = load_from_file(&self.path).await?;

        let mut current = self.current.write().await;
        if *current == loaded {
            debug!("Display config file unchanged");
            return Ok(false);
        }

        *current = loaded.clone();
        info!("Display config reloaded from disk");
        self.notify(&loaded).await;

        Ok(true)
    }

    /// Receive every accepted record, in the order it was accepted
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<DisplayConfig> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().await.push(tx);
        rx
    }

    /// Start watching the backing file for changes made by other processes
    pub async fn start_watching(self: &Arc<Self>) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        let touches_config = event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == file_name.as_deref());
                        if touches_config && (event.kind.is_modify() || event.kind.is_create()) {
                            let _ = tx.send(());
                        }
                    }
                    Err(e) => error!("File watch error: {}", e),
                }
            })?;

        // Watch the directory so the file can be replaced by rename
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        *self.watcher.lock().await = Some(watcher);

        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                loop {
                    match tokio::time::timeout(RELOAD_DEBOUNCE, rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }

                let Some(store) = store.upgrade() else {
                    return;
                };

                debug!("Config file changed, reloading");
                if let Err(e) = store.reload().await {
                    warn!("Failed to reload display config: {}", e);
                }
            }
            debug!("Config watch task stopped");
        });

        info!("Watching {:?} for changes", self.path);
        Ok(())
    }

    /// Stop the file watcher; the watch task ends once its channel drains
    pub async fn stop_watching(&self) {
        if self.watcher.lock().await.take().is_some() {
            info!("Stopped watching {:?}", self.path);
        }
    }

    async fn notify(&self, config: &DisplayConfig) {
        let mut listeners = self.listeners.lock().await;
        listeners.retain(|tx| tx.send(config.clone()).is_ok());
    }
}

/// Read and validate a persisted record.
///
/// The file is untrusted: it must be at most [`MAX_CONFIG_FILE_BYTES`], parse
/// as a JSON object and pass every field validator. Missing fields take their
/// default value.
pub async fn load_from_file(path: &Path) -> Result<DisplayConfig> {
    let size = tokio::fs::metadata(path).await?.len();
    if size > MAX_CONFIG_FILE_BYTES {
        return Err(ConfigError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit: MAX_CONFIG_FILE_BYTES,
        });
    }

    let malformed = |reason: String| ConfigError::Malformed {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = tokio::fs::read(path).await?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| malformed(e.to_string()))?;
    let fields = value
        .as_object()
        .ok_or_else(|| malformed("top-level value is not an object".to_string()))?;
    let patch = validate_fields(fields).map_err(|e| malformed(e.to_string()))?;

    let mut config = DisplayConfig::default();
    patch.apply_to(&mut config);
    Ok(config)
}

/// Write the full record next to `path` and rename it into place, so the
/// file is never observed half-written.
pub async fn persist(path: &Path, config: &DisplayConfig) -> Result<()> {
    let contents = serde_json::to_string_pretty(config)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| persist_error(path, e))?;
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| persist_error(path, e))?;

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(persist_error(path, e));
    }

    Ok(())
}

fn persist_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Persist {
        path: path.to_path_buf(),
        source,
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "overlay.json".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let tmp = temp_path(Path::new("/etc/overlay/overlay.json"));
        assert_eq!(tmp, PathBuf::from("/etc/overlay/.overlay.json.tmp"));
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("overlay.json");

        let mut config = DisplayConfig::default();
        config.max_lines = 9;
        persist(&path, &config).await.unwrap();

        assert_eq!(load_from_file(&path).await.unwrap(), config);
        assert!(!temp_path(&path).exists());
    }
}
