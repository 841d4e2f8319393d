//! Configuration and credential file locations

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_GATEWAY: &str = "http://localhost:4000";
const DEFAULT_COMMUNICATION: &str = "http://localhost:3003";
const DEFAULT_NOTIFICATION: &str = "http://localhost:4004";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST gateway base URL
    pub gateway_url: String,
    /// Chat socket.io server
    pub communication_url: String,
    /// Notification socket.io server
    pub notification_url: String,
    /// Automatic reconnection attempts after a dropped socket
    pub reconnect_attempts: u32,
    /// Fixed delay between reconnection attempts
    pub reconnect_delay_ms: u64,
    /// A remote typing flag older than this reads as idle
    pub typing_timeout_ms: u64,
    /// Notifications loaded on mount
    pub notification_page_size: u32,
    /// Whether pushed notifications raise a terminal alert
    pub desktop_alerts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY.to_string(),
            communication_url: DEFAULT_COMMUNICATION.to_string(),
            notification_url: DEFAULT_NOTIFICATION.to_string(),
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            typing_timeout_ms: 5000,
            notification_page_size: 20,
            desktop_alerts: true,
        }
    }
}

impl Config {
    /// Get config directory path
    pub fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "workmarket", "workmarket")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Credentials live next to the config file.
    pub fn credentials_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("credentials.toml"))
    }

    /// Load configuration from disk, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load a config file; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides: [(&str, &mut String); 3] = [
            ("WORKMARKET_GATEWAY_URL", &mut self.gateway_url),
            ("WORKMARKET_COMMUNICATION_URL", &mut self.communication_url),
            ("WORKMARKET_NOTIFICATION_URL", &mut self.notification_url),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                tracing::debug!("{} overrides config", key);
                *slot = value;
            }
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            gateway_url = "https://api.example.com"
            reconnect_attempts = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.gateway_url, "https://api.example.com");
        assert_eq!(config.reconnect_attempts, 2);
        assert_eq!(config.notification_url, DEFAULT_NOTIFICATION);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("workmarket-no-such-config.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.gateway_url, DEFAULT_GATEWAY);
        assert!(config.desktop_alerts);
    }

    #[test]
    fn test_env_overrides_non_empty_only() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "WORKMARKET_GATEWAY_URL" => Some("http://gw:9000".to_string()),
            "WORKMARKET_NOTIFICATION_URL" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.gateway_url, "http://gw:9000");
        assert_eq!(config.notification_url, DEFAULT_NOTIFICATION);
        assert_eq!(config.communication_url, DEFAULT_COMMUNICATION);
    }
}
