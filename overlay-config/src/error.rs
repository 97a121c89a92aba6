use std::path::PathBuf;
use thiserror::Error;

/// Violated-field messages from a rejected update, one per field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .0.join("; "))]
pub struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    pub fn new(messages: Vec<String>) -> Self {
        Self(messages)
    }

    pub fn single(message: impl Into<String>) -> Self {
        Self(vec![message.into()])
    }

    pub fn details(&self) -> &[String] {
        &self.0
    }

    pub fn into_details(self) -> Vec<String> {
        self.0
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationErrors),

    /// Write failed after validation passed; memory and disk may now differ
    #[error("Failed to persist configuration to {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file {path:?} is {size} bytes (limit {limit})")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Malformed config file {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
