//! Configuration module
//!
//! Handles application settings and the location of persisted modem state

mod settings;

pub use settings::{AppConfig, ConfigError, LoggingConfig};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Config file name inside [`config_dir`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// State file name inside [`data_dir`]
pub const STATE_FILE_NAME: &str = "modem-state.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "modemctl", "modemctl")
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the application data directory
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the log directory
pub fn log_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("logs"))
}

/// Default config file path
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Default location of the persisted baud rate
pub fn default_state_file() -> Option<PathBuf> {
    data_dir().map(|d| d.join(STATE_FILE_NAME))
}

/// Initialize application directories
pub fn init_directories() -> std::io::Result<()> {
    for dir in [config_dir(), data_dir(), log_dir()].into_iter().flatten() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(())
}
