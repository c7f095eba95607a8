//! Storage collaborators for the alerting pipeline
//!
//! The evaluation cycle only talks to the traits in this module. The
//! in-process [`MemoryStore`] implements all of them and can be saved to and
//! restored from disk through [`persistence`].

pub mod memory;
pub mod persistence;

pub use memory::{MemoryStore, StoreState};
pub use persistence::{FileBackend, PersistenceBackend, PersistenceError, StateManager};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alerts::AlertRule;
use crate::incidents::{Incident, IncidentFilter, NewIncident};
use crate::metrics::{GenerationLog, MetricSnapshot};

/// Time-ordered aggregate metrics
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Most recent snapshot, if any has been recorded
    async fn latest_snapshot(&self) -> Result<Option<MetricSnapshot>, StoreError>;

    async fn insert_snapshot(&self, snapshot: MetricSnapshot) -> Result<(), StoreError>;

    /// Newest first
    async fn recent_snapshots(&self, limit: usize) -> Result<Vec<MetricSnapshot>, StoreError>;
}

/// Persisted alert rule definitions
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list_rules(&self) -> Result<Vec<AlertRule>, StoreError>;

    async fn list_enabled_rules(&self) -> Result<Vec<AlertRule>, StoreError>;

    async fn get_rule(&self, id: &str) -> Result<Option<AlertRule>, StoreError>;

    /// Insert or replace a rule, returning the previous definition
    async fn upsert_rule(&self, rule: AlertRule) -> Result<Option<AlertRule>, StoreError>;

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StoreError>;

    async fn delete_rule(&self, id: &str) -> Result<AlertRule, StoreError>;

    /// Record a fire. A timestamp older than the stored one is ignored.
    async fn update_last_triggered(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Persisted incident records
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Persist a new incident, assigning its id
    async fn insert_incident(&self, incident: NewIncident) -> Result<Incident, StoreError>;

    /// Matching incidents, active first then newest first
    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, StoreError>;

    async fn mark_alert_sent(&self, id: &str) -> Result<(), StoreError>;

    /// Resolve every unresolved incident started before `started_before`
    async fn resolve_stale(
        &self,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
        resolution: &str,
    ) -> Result<usize, StoreError>;

    /// Delete resolved incidents that ended before `ended_before`
    async fn purge_resolved(&self, ended_before: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Raw generation requests reported by the monitored application
#[async_trait]
pub trait GenerationLogStore: Send + Sync {
    async fn insert_generation_log(&self, log: GenerationLog) -> Result<(), StoreError>;

    async fn generation_logs_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<GenerationLog>, StoreError>;
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Incident not found: {0}")]
    IncidentNotFound(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}
