//! Healthdash: health dashboard backend with threshold alerting
//!
//! Collects generation logs from the monitored application, aggregates them
//! into metric snapshots and evaluates configurable threshold rules against
//! the latest snapshot. A rule that fires is recorded as an incident and
//! fanned out to every enabled notification channel.
//!
//! # Features
//!
//! - **Rule Evaluation**: `greater_than`, `less_than`, `equal` over snapshot metrics
//! - **Cooldowns**: Per-rule minimum interval between two fires
//! - **Incidents**: Recorded on fire, auto-resolved after 24h, purged after 7 days
//! - **Channels**: Email (SMTP), Telegram bot, webhook and log
//! - **Health Probes**: Upstream checks with down/recovered notifications
//! - **Persistence**: Optional JSON state file restored at startup
//!
//! # Example
//!
//! ```no_run
//! use healthdash::alerts::{AlertChecker, AlertRule, CheckerConfig, ComparisonOperator, Notifier};
//! use healthdash::alerts::channels::LogChannel;
//! use healthdash::metrics::MetricSnapshot;
//! use healthdash::storage::{MemoryStore, RuleRepository, SnapshotStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! store
//!     .upsert_rule(AlertRule::new(
//!         "low-success",
//!         "Low success rate",
//!         "successRate",
//!         ComparisonOperator::LessThan,
//!         90.0,
//!     ))
//!     .await?;
//! store
//!     .insert_snapshot(MetricSnapshot::new(chrono::Utc::now()).with_success_rate(85.0))
//!     .await?;
//!
//! let notifier = Arc::new(Notifier::new(Duration::from_secs(10)).with_channel(Arc::new(LogChannel)));
//! let checker = AlertChecker::new(
//!     store.clone(),
//!     store.clone(),
//!     store.clone(),
//!     notifier,
//!     CheckerConfig::default(),
//! );
//!
//! let report = checker.run_cycle().await;
//! println!("{} rule(s) fired", report.fired());
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod health;
pub mod incidents;
pub mod metrics;
pub mod storage;

// Re-export commonly used types
pub use alerts::{AlertChecker, AlertMessage, AlertRule, Notifier, Severity};
pub use incidents::{Incident, IncidentStatus};
pub use metrics::MetricSnapshot;
pub use storage::{MemoryStore, StoreError};
