//! Configuration types for the conversation engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Remote service settings.
    pub api: ApiConfig,
    /// Audio capture settings.
    pub audio: AudioConfig,
    /// Chat / reply behavior settings.
    pub chat: ChatConfig,
    /// Guest-identity local storage settings.
    pub storage: StorageConfig,
}

/// Remote service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the buddy service (no trailing slash).
    pub base_url: String,
    /// Per-request timeout in seconds. Streamed replies are exempt; the
    /// stream has no timeout and ends with the transport.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_owned(),
            request_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Target sample rate for captured audio in Hz.
    pub sample_rate: u32,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            input_device: None,
        }
    }
}

/// Chat behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Consume replies incrementally via `/chat/stream`. When false the
    /// non-streaming `/chat` endpoint is used.
    pub streaming: bool,
    /// Minimum "typing" delay in ms before a non-streamed reply lands.
    /// Pacing only; no consistency implications.
    pub min_typing_delay_ms: u64,
    /// Fixed text that replaces the in-flight assistant message when the
    /// reply transport fails.
    pub failure_reply: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            streaming: true,
            min_typing_delay_ms: 400,
            failure_reply: "Hm, the connection is acting up. Try again in a moment.".to_owned(),
        }
    }
}

/// Local storage configuration for the guest identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the guest history database (None = platform default).
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the effective data directory.
    pub fn effective_data_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.data_dir {
            return dir.clone();
        }
        if let Some(data) = dirs::data_dir() {
            data.join("buddy")
        } else {
            PathBuf::from("/tmp/buddy-data")
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::BuddyError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BuddyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/buddy/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("buddy").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("buddy")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/buddy-config/config.toml")
        }
    }
}
