//! Turns a fired rule into a persisted incident

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::model::{Incident, NewIncident};
use crate::alerts::evaluator::{describe_breach, observed_value};
use crate::alerts::AlertRule;
use crate::metrics::MetricSnapshot;
use crate::storage::{IncidentStore, StoreError};

/// Service name recorded on rule-driven incidents
pub const MONITORING_SERVICE: &str = "monitoring";

/// Incident fields for `rule` firing on `value` at `now`
pub fn build_incident(rule: &AlertRule, value: Option<f64>, now: DateTime<Utc>) -> NewIncident {
    NewIncident::new(
        rule.alert_severity(),
        MONITORING_SERVICE,
        format!("Alert: {}", rule.name),
        describe_breach(rule, value),
        now,
    )
}

/// Records incidents through an [`IncidentStore`]
#[derive(Clone)]
pub struct IncidentRecorder {
    store: Arc<dyn IncidentStore>,
}

impl IncidentRecorder {
    pub fn new(store: Arc<dyn IncidentStore>) -> Self {
        Self { store }
    }

    pub async fn record_incident(
        &self,
        rule: &AlertRule,
        snapshot: &MetricSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Incident, StoreError> {
        let incident = build_incident(rule, observed_value(rule, snapshot), now);
        let stored = self.store.insert_incident(incident).await?;

        tracing::info!(
            incident_id = %stored.id,
            rule_id = %rule.id,
            severity = %stored.severity,
            "Incident recorded"
        );
        Ok(stored)
    }

    pub async fn mark_alert_sent(&self, incident_id: &str) -> Result<(), StoreError> {
        self.store.mark_alert_sent(incident_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{ComparisonOperator, RuleSeverity, Severity};
    use crate::incidents::{IncidentFilter, IncidentStatus};
    use crate::storage::MemoryStore;

    fn rule() -> AlertRule {
        AlertRule::new(
            "r1",
            "High error rate",
            "errorRate",
            ComparisonOperator::GreaterThan,
            5.0,
        )
        .with_severity(RuleSeverity::Critical)
    }

    #[test]
    fn test_build_incident() {
        let now = Utc::now();
        let incident = build_incident(&rule(), Some(6.0), now);

        assert_eq!(incident.severity, Severity::Critical);
        assert_eq!(incident.service, "monitoring");
        assert_eq!(incident.title, "Alert: High error rate");
        assert_eq!(incident.description, "errorRate threshold exceeded: 6 > 5");
        assert_eq!(incident.status, IncidentStatus::Investigating);
        assert_eq!(incident.start_time, now);
        assert!(!incident.alert_sent);
    }

    #[tokio::test]
    async fn test_record_and_mark_sent() {
        let store = Arc::new(MemoryStore::new());
        let recorder = IncidentRecorder::new(store.clone());
        let snapshot = MetricSnapshot::new(Utc::now()).with_error_rate(6.0);

        let incident = recorder
            .record_incident(&rule(), &snapshot, Utc::now())
            .await
            .unwrap();
        recorder.mark_alert_sent(&incident.id).await.unwrap();

        let stored = store.list_incidents(&IncidentFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].alert_sent);
    }
}
