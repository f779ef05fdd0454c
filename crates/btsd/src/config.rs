//! Service configuration loaded from TOML.
//!
//! Every field has a default; a missing file yields [`ServiceConfig::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use bt_core::DEFAULT_MAX_REGISTRATIONS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default socket path when neither the config file nor `BTSD_SOCKET` set one.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/btsd.sock";

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "BTSD_SOCKET";

/// How the service picks the active device on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveDeviceMode {
    /// The session whose audio path connected last becomes active.
    #[default]
    AudioConnected,
    /// Only explicit `set_active_device` calls change it.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub enabled: bool,
    pub max_connections: usize,
    pub connect_timeout_ms: u64,
    pub active_device: ActiveDeviceMode,
    /// Feature bitmask handed to the stack on init.
    pub features: u32,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_connections: 1,
            connect_timeout_ms: 10_000,
            active_device: ActiveDeviceMode::AudioConnected,
            features: 0,
        }
    }
}

impl ProfileConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    /// Per-profile listener ceiling.
    pub max_callbacks: usize,
    pub ag: ProfileConfig,
    pub hf: ProfileConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            max_callbacks: DEFAULT_MAX_REGISTRATIONS,
            ag: ProfileConfig::default(),
            hf: ProfileConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Applies `BTSD_SOCKET` if it is set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var(SOCKET_ENV) {
            if !path.is_empty() {
                self.socket_path = PathBuf::from(path);
            }
        }
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Invalid config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/btsd.sock"));
        assert_eq!(config.max_callbacks, 16);
        assert_eq!(config.ag.max_connections, 1);
        assert_eq!(config.hf.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.ag.active_device, ActiveDeviceMode::AudioConnected);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ServiceConfig::from_toml_str(
            r#"
            max_callbacks = 4

            [hf]
            max_connections = 2
            active_device = "manual"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_callbacks, 4);
        assert_eq!(config.hf.max_connections, 2);
        assert_eq!(config.hf.active_device, ActiveDeviceMode::Manual);
        assert!(config.hf.enabled);
        assert_eq!(config.ag, ProfileConfig::default());
    }

    #[test]
    fn test_malformed_file_is_error() {
        assert!(matches!(
            ServiceConfig::from_toml_str("max_callbacks = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }
}
