//! Persisted configuration for the outbox.
//!
//! Layers: built-in defaults, then an optional TOML file in the platform
//! config directory, then `OUTBOX_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OutboxError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct OutboxConfig {
    /// Remote message-submission endpoint.
    pub endpoint_url: String,
    /// SQLite file for the durable queue; resolved under the platform data
    /// dir when unset.
    pub database_path: Option<PathBuf>,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// Control-channel reply timeout in seconds.
    pub reply_timeout_secs: u64,
    /// Periodic sync wake interval in seconds; 0 disables the wake.
    pub periodic_sync_secs: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:8000/chat/message".to_string(),
            database_path: None,
            request_timeout_secs: 10,
            reply_timeout_secs: 5,
            periodic_sync_secs: 300,
        }
    }
}

impl OutboxConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("outbox-sync")
                .join("outbox.db")
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    pub fn periodic_sync(&self) -> Option<Duration> {
        if self.periodic_sync_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.periodic_sync_secs))
        }
    }
}

/// Loads and persists the configuration file.
pub struct ConfigService {
    config: OutboxConfig,
    path: PathBuf,
}

impl ConfigService {
    /// Load from the default location; falls back to defaults (with a
    /// warning) if the file is unreadable.
    pub fn new() -> Self {
        let path = Self::default_path();
        let config = match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Config load failed ({}), using defaults", e);
                OutboxConfig::default()
            }
        };
        Self { config, path }
    }

    pub fn load_from(path: &Path) -> Result<OutboxConfig> {
        config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).required(false))
            .add_source(config::Environment::with_prefix("OUTBOX"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| OutboxError::ConfigError(e.to_string()))
    }

    fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("outbox-sync")
            .join("config.toml")
    }

    pub fn get(&self) -> OutboxConfig {
        self.config.clone()
    }

    pub fn set(&mut self, config: OutboxConfig) -> Result<()> {
        self.config = config;
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutboxError::ConfigError(format!("Create config dir: {}", e)))?;
        }
        let data = toml::to_string_pretty(&self.config)
            .map_err(|e| OutboxError::ConfigError(format!("Serialize config: {}", e)))?;
        std::fs::write(&self.path, data)
            .map_err(|e| OutboxError::ConfigError(format!("Write config: {}", e)))
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = OutboxConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.periodic_sync(), Some(Duration::from_secs(300)));
        assert!(config.database_path().ends_with("outbox.db"));
    }

    #[test]
    fn test_zero_interval_disables_periodic_sync() {
        let config = OutboxConfig {
            periodic_sync_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.periodic_sync(), None);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "endpoint_url = \"https://chat.example/api/message\"\nrequest_timeout_secs = 3\n",
        )
        .unwrap();

        let config = ConfigService::load_from(&path).unwrap();
        assert_eq!(config.endpoint_url, "https://chat.example/api/message");
        assert_eq!(config.request_timeout_secs, 3);
        // Unset keys fall back to defaults
        assert_eq!(config.reply_timeout_secs, 5);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = ConfigService::load_from(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(config.endpoint_url, OutboxConfig::default().endpoint_url);
    }
}
