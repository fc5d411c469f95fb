//! Client configuration
//!
//! Stored as TOML at `<config dir>/smrp/session.toml`. Every section and field
//! has a default, so a missing file or a partial file is fine.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::session::{endpoint_for, ReconnectPolicy};
use crate::state::store::{DEFAULT_CONTEXT_HISTORY_LIMIT, DEFAULT_NOTIFICATION_LIMIT};
use crate::state::{ReconstructionMode, Settings, StoreLimits};

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    #[serde(default)]
    pub store: StoreConfig,

    /// Reconstruction settings a new session starts with
    #[serde(default)]
    pub defaults: Settings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Session to join when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

fn default_base_url() -> String {
    "ws://localhost:8000/ws".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_context_history_limit")]
    pub context_history_limit: usize,

    #[serde(default = "default_notification_limit")]
    pub notification_limit: usize,
}

fn default_context_history_limit() -> usize {
    DEFAULT_CONTEXT_HISTORY_LIMIT
}

fn default_notification_limit() -> usize {
    DEFAULT_NOTIFICATION_LIMIT
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            context_history_limit: default_context_history_limit(),
            notification_limit: default_notification_limit(),
        }
    }
}

impl StoreConfig {
    pub fn limits(&self) -> StoreLimits {
        StoreLimits {
            context_history: self.context_history_limit,
            notifications: self.notification_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("smrp").join("session.toml"))
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SessionError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| SessionError::ConfigError {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path().ok_or_else(|| SessionError::ConfigError {
            message: "No config directory on this platform".to_string(),
        })?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SessionError::IoError {
                path: parent.to_path_buf(),
                message: e.to_string(),
            })?;
        }

        let content = self.to_toml()?;

        // Atomic write
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content).map_err(|e| SessionError::IoError {
            path: temp_path.clone(),
            message: e.to_string(),
        })?;
        fs::rename(&temp_path, path).map_err(|e| SessionError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SessionError::ConfigError {
            message: format!("Failed to serialize config: {}", e),
        })
    }

    pub fn validate(&self) -> Result<()> {
        endpoint_for(&self.connection.base_url, None)?;
        self.reconnect.validate()?;
        self.defaults.validate()?;
        if self.store.context_history_limit == 0 {
            return Err(SessionError::ConfigError {
                message: "store.context_history_limit must be at least 1".to_string(),
            });
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(SessionError::ConfigError {
                message: format!(
                    "Invalid log level: {}. Must be one of: {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }
        Ok(())
    }

    /// Get a configuration value by key path (e.g., "connection.base_url")
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["connection", "base_url"] => Some(self.connection.base_url.clone()),
            ["connection", "session_id"] => self.connection.session_id.clone(),
            ["reconnect", "delay_ms"] => Some(self.reconnect.delay_ms.to_string()),
            ["reconnect", "max_attempts"] => Some(self.reconnect.max_attempts.to_string()),
            ["defaults", "mode"] => Some(self.defaults.mode.to_string()),
            ["defaults", "candidate_count"] => Some(self.defaults.candidate_count.to_string()),
            ["defaults", "temperature"] => Some(self.defaults.temperature.to_string()),
            ["logging", "level"] => Some(self.logging.level.clone()),
            _ => None,
        }
    }

    /// Set a configuration value by key path; the result must validate
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["connection", "base_url"] => next.connection.base_url = value.to_string(),
            ["connection", "session_id"] => {
                next.connection.session_id = Some(value.to_string()).filter(|s| !s.is_empty());
            }
            ["reconnect", "delay_ms"] => next.reconnect.delay_ms = parse_value(key, value)?,
            ["reconnect", "max_attempts"] => {
                next.reconnect.max_attempts = parse_value(key, value)?
            }
            ["defaults", "mode"] => {
                next.defaults.mode = match value {
                    "soft" => ReconstructionMode::Soft,
                    "hard" => ReconstructionMode::Hard,
                    "adaptive" => ReconstructionMode::Adaptive,
                    other => {
                        return Err(SessionError::ConfigError {
                            message: format!(
                                "Invalid mode: {}. Must be one of: soft, hard, adaptive",
                                other
                            ),
                        })
                    }
                }
            }
            ["defaults", "candidate_count"] => {
                next.defaults.candidate_count = parse_value(key, value)?
            }
            ["defaults", "temperature"] => next.defaults.temperature = parse_value(key, value)?,
            ["logging", "level"] => next.logging.level = value.to_string(),
            _ => {
                return Err(SessionError::ConfigError {
                    message: format!("Unknown configuration key: {}", key),
                });
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| SessionError::ConfigError {
        message: format!("Invalid value for {}: {}", key, value),
    })
}
