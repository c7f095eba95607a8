//! Plain file backend: one JSON file per key

use super::{PersistenceBackend, PersistenceConfig, PersistenceError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

const EXTENSION: &str = "json";

/// File-per-key backend under a data directory
pub struct FileBackend {
    config: PersistenceConfig,
}

impl FileBackend {
    /// Create the backend, creating the data directory if needed
    pub fn new(config: PersistenceConfig) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    /// Get the file path for a key
    fn key_path(&self, key: &str) -> PathBuf {
        self.config.data_dir.join(format!("{}.{}", key, EXTENSION))
    }
}

impl PersistenceBackend for FileBackend {
    fn write(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        let path = self.key_path(key);
        let tmp_path = self.config.data_dir.join(format!("{}.{}.tmp", key, EXTENSION));

        // Write aside and rename so a crash never leaves a torn file
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, &path)?;

        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let path = self.key_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let data = std::fs::read(path)?;
        Ok(Some(data))
    }

    fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        let path = self.key_path(key);

        if path.exists() {
            std::fs::remove_file(path)?;
        }

        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>, PersistenceError> {
        let mut keys = Vec::new();

        for entry in std::fs::read_dir(&self.config.data_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().map(|ext| ext == EXTENSION).unwrap_or(false) {
                if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(name.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
