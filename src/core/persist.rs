//! Persistence of the negotiated modem baud rate
//!
//! The modem keeps its `AT+IPR` setting across reboots once the profile is
//! stored, so the host must remember which rate it last negotiated. The
//! provisioning sequence only talks to the [`BaudRateStore`] trait.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Baud rate every EC2x module ships with
pub const FACTORY_BAUD_RATE: u32 = 115_200;

/// Persistence errors
#[derive(Error, Debug)]
pub enum PersistError {
    /// Reading or writing the backing file failed
    #[error("State file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file exists but could not be parsed
    #[error("State file is corrupt: {0}")]
    Decode(#[from] toml::de::Error),

    /// The state could not be serialized
    #[error("Failed to encode state: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Storage for the last negotiated baud rate
#[cfg_attr(test, mockall::automock)]
pub trait BaudRateStore: Send {
    /// Last persisted rate, or [`FACTORY_BAUD_RATE`] if none was ever stored
    fn load(&self) -> Result<u32, PersistError>;

    /// Persist a newly negotiated rate
    fn store(&mut self, rate: u32) -> Result<(), PersistError>;
}

/// On-disk layout of the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedState {
    baud_rate: u32,
}

/// TOML file backed store
#[derive(Debug, Clone)]
pub struct FileBaudRateStore {
    path: PathBuf,
}

impl FileBaudRateStore {
    /// Create a store backed by `path` (created on first write)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BaudRateStore for FileBaudRateStore {
    fn load(&self) -> Result<u32, PersistError> {
        if !self.path.exists() {
            return Ok(FACTORY_BAUD_RATE);
        }

        let content = std::fs::read_to_string(&self.path)?;
        let state: PersistedState = toml::from_str(&content)?;
        Ok(state.baud_rate)
    }

    fn store(&mut self, rate: u32) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&PersistedState { baud_rate: rate })?;
        std::fs::write(&self.path, content)?;
        tracing::debug!("Persisted baud rate {} to {}", rate, self.path.display());
        Ok(())
    }
}

/// In-memory store, for simulated sessions
#[derive(Debug, Clone)]
pub struct MemoryBaudRateStore {
    rate: u32,
}

impl MemoryBaudRateStore {
    /// Create a store that reports `rate` as the last negotiated rate
    pub fn new(rate: u32) -> Self {
        Self { rate }
    }
}

impl Default for MemoryBaudRateStore {
    fn default() -> Self {
        Self::new(FACTORY_BAUD_RATE)
    }
}

impl BaudRateStore for MemoryBaudRateStore {
    fn load(&self) -> Result<u32, PersistError> {
        Ok(self.rate)
    }

    fn store(&mut self, rate: u32) -> Result<(), PersistError> {
        self.rate = rate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reports_factory_rate() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBaudRateStore::new(dir.path().join("modem.toml"));
        assert_eq!(store.load().unwrap(), FACTORY_BAUD_RATE);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("modem.toml");

        let mut store = FileBaudRateStore::new(&path);
        store.store(921_600).unwrap();

        let reopened = FileBaudRateStore::new(&path);
        assert_eq!(reopened.load().unwrap(), 921_600);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modem.toml");
        std::fs::write(&path, "baud_rate = \"fast\"").unwrap();

        let store = FileBaudRateStore::new(&path);
        assert!(matches!(store.load(), Err(PersistError::Decode(_))));
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryBaudRateStore::default();
        assert_eq!(store.load().unwrap(), FACTORY_BAUD_RATE);
        store.store(460_800).unwrap();
        assert_eq!(store.load().unwrap(), 460_800);
    }
}
