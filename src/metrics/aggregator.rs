//! Snapshot aggregation from raw generation logs

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time;

use super::snapshot::MetricSnapshot;
use crate::storage::{GenerationLogStore, SnapshotStore, StoreError};

/// One generation request reported by the monitored application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationLog {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "unknown")]
    pub generation_type: String,
    #[serde(default = "unknown")]
    pub assistant_used: String,
    /// Milliseconds
    pub processing_time_ms: f64,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn unknown() -> String {
    "unknown".to_string()
}

fn default_success() -> bool {
    true
}

impl GenerationLog {
    pub fn new(processing_time_ms: f64, success: bool, created_at: DateTime<Utc>) -> Self {
        Self {
            request_id: None,
            user_id: None,
            generation_type: unknown(),
            assistant_used: unknown(),
            processing_time_ms,
            success,
            error_type: None,
            error_message: None,
            created_at,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_assistant(mut self, assistant: impl Into<String>) -> Self {
        self.assistant_used = assistant.into();
        self
    }
}

/// Aggregate the logs that fall inside `[now - window, now]` into a snapshot.
///
/// With no traffic the success rate is 100 and the error rate 0. Active
/// users are distinct user ids; assistants online are distinct assistants
/// with at least one successful generation.
pub fn aggregate(logs: &[GenerationLog], window: Duration, now: DateTime<Utc>) -> MetricSnapshot {
    let window_start = now - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::hours(1));
    let recent: Vec<&GenerationLog> = logs
        .iter()
        .filter(|log| log.created_at >= window_start && log.created_at <= now)
        .collect();

    let total = recent.len();
    let successful = recent.iter().filter(|log| log.success).count();
    let window_minutes = (window.as_secs_f64() / 60.0).max(1.0 / 60.0);

    let mut snapshot = MetricSnapshot::new(now)
        .with_generations_per_minute(total as f64 / window_minutes);

    if total > 0 {
        let total_time: f64 = recent.iter().map(|log| log.processing_time_ms).sum();
        snapshot = snapshot
            .with_average_response_time(total_time / total as f64)
            .with_success_rate(successful as f64 / total as f64 * 100.0)
            .with_error_rate((total - successful) as f64 / total as f64 * 100.0);
    }

    let users: HashSet<&str> = recent.iter().filter_map(|log| log.user_id.as_deref()).collect();
    let assistants: HashSet<&str> = recent
        .iter()
        .filter(|log| log.success && log.assistant_used != "unknown")
        .map(|log| log.assistant_used.as_str())
        .collect();

    snapshot
        .with_active_users(users.len() as i64)
        .with_assistants_online(assistants.len() as i64)
}

/// Compute a snapshot from stored logs and append it to the snapshot store
pub async fn refresh_snapshot(
    logs: &dyn GenerationLogStore,
    snapshots: &dyn SnapshotStore,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<MetricSnapshot, StoreError> {
    let since = now - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::hours(1));
    let recent = logs.generation_logs_since(since).await?;
    let snapshot = aggregate(&recent, window, now);
    snapshots.insert_snapshot(snapshot.clone()).await?;
    Ok(snapshot)
}

/// Background worker that periodically rebuilds the latest snapshot
pub struct AggregationWorker {
    logs: Arc<dyn GenerationLogStore>,
    snapshots: Arc<dyn SnapshotStore>,
    window: Duration,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl AggregationWorker {
    pub fn new(
        logs: Arc<dyn GenerationLogStore>,
        snapshots: Arc<dyn SnapshotStore>,
        window: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            logs,
            snapshots,
            window,
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Aggregation worker started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;

                match refresh_snapshot(
                    self.logs.as_ref(),
                    self.snapshots.as_ref(),
                    self.window,
                    Utc::now(),
                )
                .await
                {
                    Ok(snapshot) => tracing::debug!(
                        success_rate = snapshot.success_rate,
                        average_response_time = snapshot.average_response_time,
                        "Metrics snapshot updated"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Failed to update metrics snapshot"),
                }
            }

            tracing::info!("Aggregation worker stopped");
        })
    }

    /// Stop the worker
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
