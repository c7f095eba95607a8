//! Incident records and their query/summary types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::Severity;

/// Lifecycle status of an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Investigating,
    Identified,
    Monitoring,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Investigating => "investigating",
            IncidentStatus::Identified => "identified",
            IncidentStatus::Monitoring => "monitoring",
            IncidentStatus::Resolved => "resolved",
        }
    }

    /// Anything short of resolved counts as an active incident
    pub fn is_active(&self) -> bool {
        !matches!(self, IncidentStatus::Resolved)
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted problem episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub severity: Severity,
    pub service: String,
    pub title: String,
    pub description: String,
    pub status: IncidentStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub affected_users: i64,
    #[serde(default)]
    pub alert_sent: bool,
    #[serde(default)]
    pub resolution: Option<String>,
}

impl Incident {
    /// Materialize a new incident under the id assigned by the store
    pub fn from_new(id: impl Into<String>, new: NewIncident) -> Self {
        Self {
            id: id.into(),
            severity: new.severity,
            service: new.service,
            title: new.title,
            description: new.description,
            status: new.status,
            start_time: new.start_time,
            end_time: None,
            duration_minutes: None,
            affected_users: new.affected_users,
            alert_sent: new.alert_sent,
            resolution: None,
        }
    }

    /// Close the incident at `at`
    pub fn resolve(&mut self, at: DateTime<Utc>, resolution: impl Into<String>) {
        self.status = IncidentStatus::Resolved;
        self.end_time = Some(at);
        self.duration_minutes = Some((at - self.start_time).num_minutes().max(0));
        self.resolution = Some(resolution.into());
    }
}

/// Incident fields supplied by the caller; the store assigns the id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIncident {
    pub severity: Severity,
    pub service: String,
    pub title: String,
    pub description: String,
    pub status: IncidentStatus,
    pub start_time: DateTime<Utc>,
    pub affected_users: i64,
    pub alert_sent: bool,
}

impl NewIncident {
    pub fn new(
        severity: Severity,
        service: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            severity,
            service: service.into(),
            title: title.into(),
            description: description.into(),
            status: IncidentStatus::Investigating,
            start_time,
            affected_users: 0,
            alert_sent: false,
        }
    }

    pub fn with_status(mut self, status: IncidentStatus) -> Self {
        self.status = status;
        self
    }
}

/// Which incidents to return from a listing
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    /// Only incidents started at or after this instant
    pub since: Option<DateTime<Utc>>,
    pub severity: Option<Severity>,
    /// `None` means any status
    pub statuses: Option<Vec<IncidentStatus>>,
    pub limit: Option<usize>,
}

impl IncidentFilter {
    pub fn active() -> Self {
        Self {
            statuses: Some(vec![
                IncidentStatus::Investigating,
                IncidentStatus::Identified,
                IncidentStatus::Monitoring,
            ]),
            ..Default::default()
        }
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        if let Some(since) = self.since {
            if incident.start_time < since {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if incident.severity != severity {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&incident.status) {
                return false;
            }
        }
        true
    }
}

/// Order incidents for display: active first, then newest first
pub fn sort_for_display(incidents: &mut [Incident]) {
    incidents.sort_by(|a, b| {
        b.status
            .is_active()
            .cmp(&a.status.is_active())
            .then_with(|| b.start_time.cmp(&a.start_time))
    });
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub investigating: usize,
    pub identified: usize,
    pub monitoring: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeverityCounts {
    pub info: usize,
    pub warning: usize,
    pub error: usize,
    pub critical: usize,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Info => self.info += 1,
            Severity::Warning => self.warning += 1,
            Severity::Error => self.error += 1,
            Severity::Critical => self.critical += 1,
        }
    }
}

/// Counts over a set of incidents
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IncidentSummary {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
    pub critical: usize,
    pub by_status: StatusCounts,
    pub by_severity: SeverityCounts,
}

impl IncidentSummary {
    pub fn from_incidents(incidents: &[Incident]) -> Self {
        let mut summary = Self {
            total: incidents.len(),
            ..Default::default()
        };

        for incident in incidents {
            if incident.status.is_active() {
                summary.active += 1;
            } else {
                summary.resolved += 1;
            }
            if incident.severity == Severity::Critical {
                summary.critical += 1;
            }
            match incident.status {
                IncidentStatus::Investigating => summary.by_status.investigating += 1,
                IncidentStatus::Identified => summary.by_status.identified += 1,
                IncidentStatus::Monitoring => summary.by_status.monitoring += 1,
                IncidentStatus::Resolved => summary.by_status.resolved += 1,
            }
            summary.by_severity.add(incident.severity);
        }

        summary
    }
}
