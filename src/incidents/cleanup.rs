//! Auto-resolution of stale incidents and purging of old ones

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time;

use crate::storage::{IncidentStore, StoreError};

pub const AUTO_RESOLUTION: &str = "Auto-resolved: Incident older than 24 hours";

/// Age limits applied by [`run_cleanup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    /// Unresolved incidents started longer ago than this are resolved
    pub resolve_after: chrono::Duration,
    /// Resolved incidents that ended longer ago than this are deleted
    pub purge_after: chrono::Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            resolve_after: chrono::Duration::hours(24),
            purge_after: chrono::Duration::days(7),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub closed: usize,
    pub deleted: usize,
}

/// Resolve stale incidents, then purge old resolved ones
pub async fn run_cleanup(
    store: &dyn IncidentStore,
    policy: &CleanupPolicy,
    now: DateTime<Utc>,
) -> Result<CleanupReport, StoreError> {
    let closed = store
        .resolve_stale(now - policy.resolve_after, now, AUTO_RESOLUTION)
        .await?;
    let deleted = store.purge_resolved(now - policy.purge_after).await?;

    if closed > 0 || deleted > 0 {
        tracing::info!(closed, deleted, "Incident cleanup completed");
    }
    Ok(CleanupReport { closed, deleted })
}

/// Background worker running [`run_cleanup`] on an interval
pub struct CleanupWorker {
    store: Arc<dyn IncidentStore>,
    policy: CleanupPolicy,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl CleanupWorker {
    pub fn new(store: Arc<dyn IncidentStore>, policy: CleanupPolicy, interval: Duration) -> Self {
        Self {
            store,
            policy,
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Incident cleanup worker started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;

                if let Err(e) = run_cleanup(self.store.as_ref(), &self.policy, Utc::now()).await {
                    tracing::warn!(error = %e, "Incident cleanup failed");
                }
            }

            tracing::info!("Incident cleanup worker stopped");
        })
    }

    /// Stop the worker
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
