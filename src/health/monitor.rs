//! Tracks probe results over time and notifies on transitions

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time;

use super::prober::{overall_status, HealthProber, ServiceHealth, ServiceStatus};
use crate::alerts::templates::{service_down, service_recovered};
use crate::alerts::{Notifier, StatusUpdate, SystemStatus};

/// Latest health picture
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: SystemStatus,
    pub checked_at: DateTime<Utc>,
    /// Percentage of services fully operational
    pub health_score: u32,
    pub services: Vec<ServiceHealth>,
}

impl HealthReport {
    pub fn from_services(services: Vec<ServiceHealth>, checked_at: DateTime<Utc>) -> Self {
        let operational = services
            .iter()
            .filter(|s| s.status == ServiceStatus::Operational)
            .count();
        let health_score = if services.is_empty() {
            100
        } else {
            (operational * 100 / services.len()) as u32
        };

        Self {
            status: overall_status(&services),
            checked_at,
            health_score,
            services,
        }
    }
}

/// A service going down or coming back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Down { service: String, error: Option<String> },
    Recovered { service: String, downtime: Option<String> },
}

struct DownSince {
    status: ServiceStatus,
    since: Option<DateTime<Utc>>,
}

/// Runs probes and turns status changes into notifications
pub struct HealthMonitor {
    prober: HealthProber,
    notifier: Arc<Notifier>,
    services: RwLock<HashMap<String, DownSince>>,
    latest: RwLock<Option<HealthReport>>,
    running: Arc<AtomicBool>,
}

impl HealthMonitor {
    pub fn new(prober: HealthProber, notifier: Arc<Notifier>) -> Self {
        Self {
            prober,
            notifier,
            services: RwLock::new(HashMap::new()),
            latest: RwLock::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn latest(&self) -> Option<HealthReport> {
        self.latest.read().clone()
    }

    /// Probe all targets now and notify on changes
    pub async fn check_now(&self) -> HealthReport {
        let results = self.prober.check_all().await;
        self.record(results, Utc::now()).await
    }

    /// Fold new results into the tracked state, sending alerts for each
    /// transition and a status update when the overall status changes
    pub async fn record(&self, results: Vec<ServiceHealth>, now: DateTime<Utc>) -> HealthReport {
        let previous_overall = self.latest.read().as_ref().map(|r| r.status);
        let transitions = self.apply(&results, now);
        let report = HealthReport::from_services(results, now);
        *self.latest.write() = Some(report.clone());

        for transition in &transitions {
            let alert = match transition {
                Transition::Down { service, error } => service_down(service, error.as_deref()),
                Transition::Recovered { service, downtime } => {
                    service_recovered(service, downtime.as_deref())
                }
            };
            self.notifier.dispatch(&alert).await;
        }

        // First check only reports when something is already wrong
        let changed = match previous_overall {
            Some(previous) => previous != report.status,
            None => report.status != SystemStatus::Operational,
        };
        if changed {
            let affected: Vec<String> = report
                .services
                .iter()
                .filter(|s| s.status != ServiceStatus::Operational)
                .map(|s| s.service.clone())
                .collect();
            let update = StatusUpdate::new(report.status).with_affected_services(affected);
            self.notifier.send_status_update(&update).await;
        }

        report
    }

    fn apply(&self, results: &[ServiceHealth], now: DateTime<Utc>) -> Vec<Transition> {
        let mut services = self.services.write();
        let mut transitions = Vec::new();

        for result in results {
            let entry = services.entry(result.service.clone()).or_insert(DownSince {
                status: ServiceStatus::Operational,
                since: None,
            });

            match (entry.status.is_down(), result.status.is_down()) {
                (false, true) => {
                    entry.since = Some(now);
                    transitions.push(Transition::Down {
                        service: result.service.clone(),
                        error: result.error.clone(),
                    });
                }
                (true, false) => {
                    let downtime = entry
                        .since
                        .take()
                        .map(|since| format!("{}m", (now - since).num_minutes().max(0)));
                    transitions.push(Transition::Recovered {
                        service: result.service.clone(),
                        downtime,
                    });
                }
                _ => {}
            }
            entry.status = result.status;
        }

        transitions
    }

    /// Start periodic probing
    pub fn start(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Health monitor started with interval {:?}", interval);

            let mut interval = time::interval(interval);

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;
                let report = self.check_now().await;
                tracing::debug!(status = %report.status, score = report.health_score, "Health check completed");
            }

            tracing::info!("Health monitor stopped");
        })
    }

    /// Stop the monitor
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
