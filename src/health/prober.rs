//! HTTP probes of upstream services

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::alerts::SystemStatus;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_DEGRADED_AFTER: Duration = Duration::from_millis(2000);

/// Health of a single service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Operational,
    /// Answering, but slowly
    Degraded,
    /// Answering with an error status
    Partial,
    /// Unreachable
    Major,
}

impl ServiceStatus {
    pub fn is_down(&self) -> bool {
        matches!(self, ServiceStatus::Major)
    }
}

/// Result of probing one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service: String,
    pub status: ServiceStatus,
    pub response_time_ms: u64,
    pub last_check: DateTime<Utc>,
    #[serde(default)]
    pub http_status: Option<u16>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A named URL to probe with GET
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub name: String,
    pub url: String,
}

impl ProbeTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Worst service status folded into an overall system status
pub fn overall_status(services: &[ServiceHealth]) -> SystemStatus {
    if services.iter().any(|s| s.status == ServiceStatus::Major) {
        SystemStatus::Major
    } else if services
        .iter()
        .any(|s| matches!(s.status, ServiceStatus::Degraded | ServiceStatus::Partial))
    {
        SystemStatus::Degraded
    } else {
        SystemStatus::Operational
    }
}

/// Probes targets over HTTP
pub struct HealthProber {
    client: reqwest::Client,
    targets: Vec<ProbeTarget>,
    degraded_after: Duration,
}

impl HealthProber {
    pub fn new(targets: Vec<ProbeTarget>) -> Result<Self, reqwest::Error> {
        // No pooling: every probe should open a fresh connection
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_PROBE_TIMEOUT)
            .pool_max_idle_per_host(0)
            .user_agent(concat!("healthdash/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            targets,
            degraded_after: DEFAULT_DEGRADED_AFTER,
        })
    }

    pub fn with_degraded_after(mut self, degraded_after: Duration) -> Self {
        self.degraded_after = degraded_after;
        self
    }

    pub fn targets(&self) -> &[ProbeTarget] {
        &self.targets
    }

    pub async fn probe(&self, target: &ProbeTarget) -> ServiceHealth {
        let start = Instant::now();
        let result = self.client.get(&target.url).send().await;
        let elapsed = start.elapsed();

        let mut health = ServiceHealth {
            service: target.name.clone(),
            status: ServiceStatus::Operational,
            response_time_ms: elapsed.as_millis() as u64,
            last_check: Utc::now(),
            http_status: None,
            error: None,
        };

        match result {
            Ok(response) => {
                let status = response.status();
                health.http_status = Some(status.as_u16());
                if !status.is_success() {
                    health.status = ServiceStatus::Partial;
                    health.error = Some(format!("HTTP {}", status.as_u16()));
                } else if elapsed > self.degraded_after {
                    health.status = ServiceStatus::Degraded;
                }
            }
            Err(e) => {
                health.status = ServiceStatus::Major;
                health.response_time_ms = 0;
                health.error = Some(e.to_string());
            }
        }

        tracing::debug!(
            service = %health.service,
            status = ?health.status,
            response_time_ms = health.response_time_ms,
            "Health probe finished"
        );
        health
    }

    /// Probe every target concurrently
    pub async fn check_all(&self) -> Vec<ServiceHealth> {
        join_all(self.targets.iter().map(|t| self.probe(t))).await
    }
}
