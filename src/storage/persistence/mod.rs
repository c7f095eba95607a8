//! Persistence of store contents across restarts
//!
//! State is written as JSON documents through a key/value backend.

pub mod file;
pub mod state;

pub use file::FileBackend;
pub use state::{AutosaveWorker, StateManager, StateMetadata};

use std::path::Path;

/// Trait for persistence backends
pub trait PersistenceBackend: Send + Sync {
    /// Write data to persistence
    fn write(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError>;

    /// Read data from persistence
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Delete data from persistence
    fn delete(&self, key: &str) -> Result<(), PersistenceError>;

    /// List all keys
    fn list_keys(&self) -> Result<Vec<String>, PersistenceError>;
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Base directory for persistence files
    pub data_dir: std::path::PathBuf,
    /// Autosave interval in seconds
    pub save_interval_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: std::path::PathBuf::from("./healthdash_data"),
            save_interval_secs: 60,
        }
    }
}

impl PersistenceConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn with_save_interval(mut self, secs: u64) -> Self {
        self.save_interval_secs = secs;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Unsupported schema version {found}, expected {expected}")]
    SchemaVersion { found: u32, expected: u32 },
}
