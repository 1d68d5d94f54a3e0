// Configuration Management Module
// Handles movbay.toml loading, defaults, and validation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use anyhow::{Result, Context};
use tracing::{info, warn};

/// Main client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovbayConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub socket: SocketConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for persisted cart, favorites and session state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Chat socket endpoint and reconnection policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketConfig {
    /// `ws` or `wss`
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Host and optional port of the chat server
    #[serde(default = "default_socket_host")]
    pub host: String,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Backoff base; attempt n waits base * 2^n
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff cap
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

// Default value functions
fn default_data_dir() -> PathBuf { PathBuf::from(".movbay") }
fn default_api_base_url() -> String { "https://api.movbay.com".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_scheme() -> String { "ws".to_string() }
fn default_socket_host() -> String { "api.movbay.com".to_string() }
fn default_max_reconnect_attempts() -> u32 { 5 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 30000 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_socket_host(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl MovbayConfig {
    /// Load configuration from file or use defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let contents = std::fs::read_to_string(path)
                .context("Failed to read configuration file")?;

            let config = Self::from_toml(&contents)?;
            Ok(config)
        } else {
            warn!("Configuration file not found, using defaults");
            info!("Create movbay.toml to customize configuration");
            Ok(Self::default())
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: MovbayConfig = toml::from_str(contents)
            .context("Failed to parse configuration file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.as_os_str().is_empty() {
            anyhow::bail!("Storage data_dir cannot be empty");
        }

        // Validate API config
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://")) {
            anyhow::bail!("API base_url must start with http:// or https://");
        }

        if self.api.timeout_secs == 0 {
            anyhow::bail!("API timeout must be at least 1 second");
        }

        // Validate socket config
        if self.socket.scheme != "ws" && self.socket.scheme != "wss" {
            anyhow::bail!("Socket scheme must be ws or wss, got {}", self.socket.scheme);
        }

        if self.socket.host.trim().is_empty() {
            anyhow::bail!("Socket host cannot be empty");
        }

        if self.socket.max_reconnect_attempts == 0 {
            anyhow::bail!("max_reconnect_attempts must be at least 1");
        }

        if self.socket.base_delay_ms == 0 {
            anyhow::bail!("base_delay_ms must be at least 1");
        }

        if self.socket.base_delay_ms > self.socket.max_delay_ms {
            anyhow::bail!("base_delay_ms cannot exceed max_delay_ms");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MovbayConfig::default();
        assert_eq!(config.socket.max_reconnect_attempts, 5);
        assert_eq!(config.socket.base_delay_ms, 1000);
        assert_eq!(config.socket.max_delay_ms, 30000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = MovbayConfig::from_toml(
            r#"
            [socket]
            host = "chat.internal:8000"
            "#,
        )
        .unwrap();

        assert_eq!(config.socket.host, "chat.internal:8000");
        assert_eq!(config.socket.scheme, "ws");
        assert_eq!(config.api, ApiConfig::default());
    }

    #[test]
    fn test_invalid_backoff_bounds() {
        let mut config = MovbayConfig::default();
        config.socket.base_delay_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_scheme() {
        let mut config = MovbayConfig::default();
        config.socket.scheme = "http".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = MovbayConfig::load(temp.path().join("movbay.toml")).unwrap();
        assert_eq!(config, MovbayConfig::default());
    }
}
