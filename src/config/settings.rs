//! Application settings

use crate::core::dce::{CommandTimeouts, ProvisionConfig};
use crate::core::logger::LogFormat;
use crate::core::transport::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No platform config directory and no explicit path
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Reading or writing the file failed
    #[error("Config file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for this schema
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Settings could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where the negotiated baud rate is kept (platform data dir if unset)
    pub state_file: Option<PathBuf>,
    /// Serial link settings
    pub serial: SerialConfig,
    /// Per-command timeouts
    pub timeouts: CommandTimeouts,
    /// Bring-up parameters
    pub provisioning: ProvisionConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from `path`, or from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::resolve(path)?;
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = toml::from_str(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to `path`, or to the default location. Returns the path
    /// written.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = Self::resolve(path)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, self.to_toml()?)?;
        Ok(path)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Path of the baud rate state file
    pub fn state_file_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .or_else(super::default_state_file)
            .unwrap_or_else(|| PathBuf::from(super::STATE_FILE_NAME))
    }

    fn resolve(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        match path {
            Some(p) => Ok(p.to_path_buf()),
            None => super::default_config_path().ok_or(ConfigError::NoConfigDir),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level or filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Also write a daily rolling log file
    pub to_file: bool,
    /// Log file directory
    pub directory: Option<PathBuf>,
    /// Trace every line sent and received
    pub wire_trace: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            to_file: false,
            directory: super::log_dir(),
            wire_trace: false,
        }
    }
}
