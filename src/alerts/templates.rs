//! System status updates and canned alerts

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::Severity;
use super::notifier::AlertMessage;

/// Overall system status reported to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Operational,
    Degraded,
    Major,
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Operational => "operational",
            SystemStatus::Degraded => "degraded",
            SystemStatus::Major => "major",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            SystemStatus::Operational => "✅",
            SystemStatus::Degraded => "⚠️",
            SystemStatus::Major => "🚨",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            SystemStatus::Operational => Severity::Info,
            SystemStatus::Degraded => Severity::Warning,
            SystemStatus::Major => Severity::Critical,
        }
    }

    /// `Operational`, `Degraded`, `Major`
    pub fn label(&self) -> &'static str {
        match self {
            SystemStatus::Operational => "Operational",
            SystemStatus::Degraded => "Degraded",
            SystemStatus::Major => "Major",
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change of overall system status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: SystemStatus,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub affected_services: Vec<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(status: SystemStatus) -> Self {
        Self {
            status,
            details: None,
            affected_services: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_affected_services(mut self, services: Vec<String>) -> Self {
        self.affected_services = services;
        self
    }

    pub fn title(&self) -> String {
        format!(
            "{} System Status: {}",
            self.status.emoji(),
            self.status.as_str().to_uppercase()
        )
    }

    /// The update rendered as a regular alert, for channels without a
    /// dedicated status format
    pub fn to_alert(&self) -> AlertMessage {
        let mut message = format!("System status has changed to: {}", self.status);
        if let Some(details) = &self.details {
            message.push_str(&format!("\n\nDetails: {}", details));
        }
        if !self.affected_services.is_empty() {
            message.push_str(&format!(
                "\n\nAffected services: {}",
                self.affected_services.join(", ")
            ));
        }

        AlertMessage::new(self.title(), message, self.status.severity(), "system")
            .with_timestamp(self.timestamp)
    }
}

/// Response time above `threshold`; critical beyond twice the threshold
pub fn high_response_time(service: &str, current_ms: f64, threshold_ms: f64) -> AlertMessage {
    let severity = if current_ms > threshold_ms * 2.0 {
        Severity::Critical
    } else {
        Severity::Warning
    };
    AlertMessage::new(
        "High Response Time Detected",
        format!(
            "Response time for {} has exceeded the warning threshold. \
             This may indicate performance degradation or high system load.",
            service
        ),
        severity,
        service,
    )
    .with_metric("responseTime", current_ms, threshold_ms)
}

/// Success rate below `threshold`; critical more than 10 points below
pub fn low_success_rate(service: &str, current: f64, threshold: f64) -> AlertMessage {
    let severity = if current < threshold - 10.0 {
        Severity::Critical
    } else {
        Severity::Warning
    };
    AlertMessage::new(
        "Low Success Rate Detected",
        format!(
            "Success rate for {} has dropped below the warning threshold. \
             Users may be experiencing failures.",
            service
        ),
        severity,
        service,
    )
    .with_metric("successRate", current, threshold)
}

pub fn service_down(service: &str, error: Option<&str>) -> AlertMessage {
    let reason = match error {
        Some(e) => format!("Error: {}", e),
        None => "Health check failed.".to_string(),
    };
    AlertMessage::new(
        format!("Service Down: {}", service),
        format!("{} is currently unavailable. {}", service, reason),
        Severity::Critical,
        service,
    )
}

pub fn service_recovered(service: &str, downtime: Option<&str>) -> AlertMessage {
    let mut message = format!("{} has recovered and is now operational.", service);
    if let Some(downtime) = downtime {
        message.push_str(&format!(" Downtime: {}", downtime));
    }
    AlertMessage::new(
        format!("Service Recovered: {}", service),
        message,
        Severity::Info,
        service,
    )
}

pub fn maintenance(service: &str, duration: &str, start_time: DateTime<Utc>) -> AlertMessage {
    AlertMessage::new(
        format!("Scheduled Maintenance: {}", service),
        format!(
            "Scheduled maintenance for {} will begin at {} and is expected to last {}.",
            service,
            start_time.format("%Y-%m-%d %H:%M UTC"),
            duration
        ),
        Severity::Info,
        service,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_update_to_alert() {
        let update = StatusUpdate::new(SystemStatus::Major)
            .with_details("database unreachable")
            .with_affected_services(vec!["api".to_string(), "worker".to_string()]);

        let alert = update.to_alert();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.service, "system");
        assert_eq!(alert.title, "🚨 System Status: MAJOR");
        assert!(alert.message.contains("Details: database unreachable"));
        assert!(alert.message.contains("Affected services: api, worker"));
    }

    #[test]
    fn test_response_time_severity() {
        assert_eq!(high_response_time("api", 3000.0, 2000.0).severity, Severity::Warning);
        assert_eq!(high_response_time("api", 4500.0, 2000.0).severity, Severity::Critical);
        let alert = high_response_time("api", 3000.0, 2000.0);
        assert_eq!(alert.metric.as_deref(), Some("responseTime"));
        assert_eq!(alert.current_value, Some(3000.0));
    }

    #[test]
    fn test_success_rate_severity() {
        assert_eq!(low_success_rate("api", 85.0, 90.0).severity, Severity::Warning);
        assert_eq!(low_success_rate("api", 75.0, 90.0).severity, Severity::Critical);
    }

    #[test]
    fn test_service_down_and_recovered() {
        let down = service_down("api", Some("connection refused"));
        assert_eq!(down.severity, Severity::Critical);
        assert_eq!(down.message, "api is currently unavailable. Error: connection refused");

        let down = service_down("api", None);
        assert!(down.message.ends_with("Health check failed."));

        let up = service_recovered("api", Some("5m"));
        assert_eq!(up.severity, Severity::Info);
        assert_eq!(up.message, "api has recovered and is now operational. Downtime: 5m");
    }

    #[test]
    fn test_maintenance() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap();
        let alert = maintenance("database", "2 hours", start);
        assert_eq!(alert.title, "Scheduled Maintenance: database");
        assert!(alert.message.contains("2024-06-01 02:00 UTC"));
        assert!(alert.message.contains("2 hours"));
    }
}
