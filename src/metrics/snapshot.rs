//! Point-in-time aggregate metric readings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric names a rule may reference, in their canonical form
pub const METRIC_NAMES: &[&str] = &[
    "generationsPerMinute",
    "averageResponseTime",
    "successRate",
    "errorRate",
    "activeUsers",
    "assistantsOnline",
];

/// Immutable aggregate of system metrics at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub generations_per_minute: f64,
    /// Milliseconds
    pub average_response_time: f64,
    /// Percentage, 0-100
    pub success_rate: f64,
    /// Percentage, 0-100
    pub error_rate: f64,
    pub active_users: i64,
    pub assistants_online: i64,
    pub timestamp: DateTime<Utc>,
}

impl MetricSnapshot {
    /// Create an idle snapshot: no traffic, nothing failing
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            generations_per_minute: 0.0,
            average_response_time: 0.0,
            success_rate: 100.0,
            error_rate: 0.0,
            active_users: 0,
            assistants_online: 0,
            timestamp,
        }
    }

    pub fn with_generations_per_minute(mut self, value: f64) -> Self {
        self.generations_per_minute = value;
        self
    }

    pub fn with_average_response_time(mut self, value: f64) -> Self {
        self.average_response_time = value;
        self
    }

    pub fn with_success_rate(mut self, value: f64) -> Self {
        self.success_rate = value;
        self
    }

    pub fn with_error_rate(mut self, value: f64) -> Self {
        self.error_rate = value;
        self
    }

    pub fn with_active_users(mut self, value: i64) -> Self {
        self.active_users = value;
        self
    }

    pub fn with_assistants_online(mut self, value: i64) -> Self {
        self.assistants_online = value;
        self
    }

    /// Look up a metric by name.
    ///
    /// Accepts the camelCase names stored on alert rules as well as the
    /// snake_case field names. Unknown names return `None`.
    pub fn metric(&self, name: &str) -> Option<f64> {
        match name {
            "generationsPerMinute" | "generations_per_minute" => Some(self.generations_per_minute),
            "averageResponseTime" | "average_response_time" => Some(self.average_response_time),
            "successRate" | "success_rate" => Some(self.success_rate),
            "errorRate" | "error_rate" => Some(self.error_rate),
            "activeUsers" | "active_users" => Some(self.active_users as f64),
            "assistantsOnline" | "assistants_online" => Some(self.assistants_online as f64),
            _ => None,
        }
    }

    /// Whether `name` refers to a known metric
    pub fn is_known_metric(name: &str) -> bool {
        Self::new(DateTime::<Utc>::default()).metric(name).is_some()
    }
}
