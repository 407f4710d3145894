//! Dispatcher configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a fake reply answers the engine's "bytes available" query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AvailableBytes {
    /// Buffered length minus what was already read.
    #[default]
    Remaining,
    /// Legacy engines expect the full buffered length (as of the last write)
    /// while unread data remains. With `below` set, only for content shorter
    /// than that many bytes.
    FullContent { below: Option<usize> },
}

/// Configuration for a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Read-size reporting for every reply created by the dispatcher.
    pub available_bytes: AvailableBytes,

    /// Attach the script runtime with the WebSocket shim.
    pub script_runtime: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            available_bytes: AvailableBytes::Remaining,
            script_runtime: true,
        }
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_available_bytes(mut self, available_bytes: AvailableBytes) -> Self {
        self.available_bytes = available_bytes;
        self
    }

    pub fn with_script_runtime(mut self, enabled: bool) -> Self {
        self.script_runtime = enabled;
        self
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded dispatch config from {}", path.display());
        Ok(config)
    }
}
