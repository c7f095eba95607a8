//! Save and restore the full store state

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time;

use super::{FileBackend, PersistenceBackend, PersistenceConfig, PersistenceError};
use crate::storage::{MemoryStore, StoreState};

const STATE_KEY: &str = "state";
const METADATA_KEY: &str = "_latest";
const SCHEMA_VERSION: u32 = 1;

/// Describes the most recent save
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StateMetadata {
    pub saved_at: DateTime<Utc>,
    pub rules: usize,
    pub incidents: usize,
    pub snapshots: usize,
    pub size_bytes: usize,
    /// Schema version for compatibility
    pub schema_version: u32,
}

/// Writes [`StoreState`] documents through a backend
pub struct StateManager {
    backend: Box<dyn PersistenceBackend>,
    latest: RwLock<Option<StateMetadata>>,
}

impl StateManager {
    /// Open a file-backed manager rooted at `config.data_dir`
    pub fn new(config: PersistenceConfig) -> Result<Self, PersistenceError> {
        Self::with_backend(Box::new(FileBackend::new(config)?))
    }

    pub fn with_backend(backend: Box<dyn PersistenceBackend>) -> Result<Self, PersistenceError> {
        let manager = Self {
            backend,
            latest: RwLock::new(None),
        };

        if let Some(data) = manager.backend.read(METADATA_KEY)? {
            let metadata: StateMetadata = serde_json::from_slice(&data)
                .map_err(|e| PersistenceError::Deserialization(e.to_string()))?;
            *manager.latest.write() = Some(metadata);
        }

        Ok(manager)
    }

    /// Persist the store contents
    pub fn save(&self, store: &MemoryStore) -> Result<StateMetadata, PersistenceError> {
        let state = store.export_state();
        let data = serde_json::to_vec(&state)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        let metadata = StateMetadata {
            saved_at: Utc::now(),
            rules: state.rules.len(),
            incidents: state.incidents.len(),
            snapshots: state.snapshots.len(),
            size_bytes: data.len(),
            schema_version: SCHEMA_VERSION,
        };
        let metadata_bytes = serde_json::to_vec(&metadata)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        self.backend.write(STATE_KEY, &data)?;
        self.backend.write(METADATA_KEY, &metadata_bytes)?;
        *self.latest.write() = Some(metadata.clone());

        Ok(metadata)
    }

    /// Load the last saved state into `store`. Returns `None` if nothing was saved.
    pub fn restore(&self, store: &MemoryStore) -> Result<Option<StateMetadata>, PersistenceError> {
        let metadata = match self.latest() {
            Some(m) => m,
            None => return Ok(None),
        };

        if metadata.schema_version != SCHEMA_VERSION {
            return Err(PersistenceError::SchemaVersion {
                found: metadata.schema_version,
                expected: SCHEMA_VERSION,
            });
        }

        let Some(data) = self.backend.read(STATE_KEY)? else {
            return Ok(None);
        };
        let state: StoreState = serde_json::from_slice(&data)
            .map_err(|e| PersistenceError::Deserialization(e.to_string()))?;
        store.restore_state(state);

        Ok(Some(metadata))
    }

    pub fn latest(&self) -> Option<StateMetadata> {
        self.latest.read().clone()
    }
}

/// Periodically saves the store
pub struct AutosaveWorker {
    manager: Arc<StateManager>,
    store: Arc<MemoryStore>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl AutosaveWorker {
    pub fn new(manager: Arc<StateManager>, store: Arc<MemoryStore>, interval: Duration) -> Self {
        Self {
            manager,
            store,
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Autosave worker started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);
            // The first tick completes immediately; nothing has changed yet
            interval.tick().await;

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;
                self.save_now();
            }

            tracing::info!("Autosave worker stopped");
        })
    }

    /// Save immediately, logging the outcome
    pub fn save_now(&self) {
        match self.manager.save(&self.store) {
            Ok(metadata) => tracing::debug!(
                rules = metadata.rules,
                incidents = metadata.incidents,
                size_bytes = metadata.size_bytes,
                "State saved"
            ),
            Err(e) => tracing::error!(error = %e, "Failed to save state"),
        }
    }

    /// Stop the worker
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
