//! In-process store implementing every storage trait

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{GenerationLogStore, IncidentStore, RuleRepository, SnapshotStore, StoreError};
use crate::alerts::{AlertRule, MAX_COOLDOWN_SECS};
use crate::incidents::{sort_for_display, Incident, IncidentFilter, IncidentStatus, NewIncident};
use crate::metrics::{GenerationLog, MetricSnapshot};

/// Default number of snapshots retained (one day at one per minute)
pub const DEFAULT_MAX_SNAPSHOTS: usize = 1440;
/// Default number of generation logs retained
pub const DEFAULT_MAX_GENERATION_LOGS: usize = 50_000;

/// Serializable copy of everything the store holds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    pub snapshots: Vec<MetricSnapshot>,
    pub rules: Vec<AlertRule>,
    pub incidents: Vec<Incident>,
    #[serde(default)]
    pub generation_logs: Vec<GenerationLog>,
    pub next_incident_id: u64,
}

/// Bounded in-memory store
pub struct MemoryStore {
    /// Ordered oldest to newest
    snapshots: RwLock<VecDeque<MetricSnapshot>>,
    rules: DashMap<String, AlertRule>,
    incidents: DashMap<String, Incident>,
    /// Ordered oldest to newest
    generation_logs: RwLock<VecDeque<GenerationLog>>,
    next_incident_id: AtomicU64,
    max_snapshots: usize,
    max_generation_logs: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_SNAPSHOTS, DEFAULT_MAX_GENERATION_LOGS)
    }

    pub fn with_limits(max_snapshots: usize, max_generation_logs: usize) -> Self {
        Self {
            snapshots: RwLock::new(VecDeque::new()),
            rules: DashMap::new(),
            incidents: DashMap::new(),
            generation_logs: RwLock::new(VecDeque::new()),
            next_incident_id: AtomicU64::new(1),
            max_snapshots: max_snapshots.max(1),
            max_generation_logs: max_generation_logs.max(1),
        }
    }

    /// Copy out the full contents
    pub fn export_state(&self) -> StoreState {
        let mut rules: Vec<AlertRule> = self.rules.iter().map(|r| r.value().clone()).collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));

        let mut incidents: Vec<Incident> =
            self.incidents.iter().map(|i| i.value().clone()).collect();
        incidents.sort_by(|a, b| a.start_time.cmp(&b.start_time));

        StoreState {
            snapshots: self.snapshots.read().iter().cloned().collect(),
            rules,
            incidents,
            generation_logs: self.generation_logs.read().iter().cloned().collect(),
            next_incident_id: self.next_incident_id.load(Ordering::SeqCst),
        }
    }

    /// Replace the full contents
    pub fn restore_state(&self, state: StoreState) {
        let mut snapshots: Vec<MetricSnapshot> = state.snapshots;
        snapshots.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let skip = snapshots.len().saturating_sub(self.max_snapshots);
        *self.snapshots.write() = snapshots.into_iter().skip(skip).collect();

        self.rules.clear();
        for rule in state.rules {
            self.rules.insert(rule.id.clone(), rule);
        }

        self.incidents.clear();
        let mut max_id = 0;
        for incident in state.incidents {
            if let Some(n) = parse_incident_seq(&incident.id) {
                max_id = max_id.max(n);
            }
            self.incidents.insert(incident.id.clone(), incident);
        }

        let mut logs = state.generation_logs;
        logs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let skip = logs.len().saturating_sub(self.max_generation_logs);
        *self.generation_logs.write() = logs.into_iter().skip(skip).collect();

        let next = state.next_incident_id.max(max_id + 1).max(1);
        self.next_incident_id.store(next, Ordering::SeqCst);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn incident_count(&self) -> usize {
        self.incidents.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_incident_seq(id: &str) -> Option<u64> {
    id.strip_prefix("inc-").and_then(|n| n.parse().ok())
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn latest_snapshot(&self) -> Result<Option<MetricSnapshot>, StoreError> {
        Ok(self.snapshots.read().back().cloned())
    }

    async fn insert_snapshot(&self, snapshot: MetricSnapshot) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write();

        // Keep time order even if snapshots arrive late
        let pos = snapshots
            .iter()
            .rposition(|s| s.timestamp <= snapshot.timestamp)
            .map(|i| i + 1)
            .unwrap_or(0);
        snapshots.insert(pos, snapshot);

        while snapshots.len() > self.max_snapshots {
            snapshots.pop_front();
        }
        Ok(())
    }

    async fn recent_snapshots(&self, limit: usize) -> Result<Vec<MetricSnapshot>, StoreError> {
        Ok(self.snapshots.read().iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl RuleRepository for MemoryStore {
    async fn list_rules(&self) -> Result<Vec<AlertRule>, StoreError> {
        let mut rules: Vec<AlertRule> = self.rules.iter().map(|r| r.value().clone()).collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rules)
    }

    async fn list_enabled_rules(&self) -> Result<Vec<AlertRule>, StoreError> {
        let mut rules: Vec<AlertRule> = self
            .rules
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rules)
    }

    async fn get_rule(&self, id: &str) -> Result<Option<AlertRule>, StoreError> {
        Ok(self.rules.get(id).map(|r| r.value().clone()))
    }

    async fn upsert_rule(&self, rule: AlertRule) -> Result<Option<AlertRule>, StoreError> {
        if rule.id.trim().is_empty() {
            return Err(StoreError::InvalidRule("rule id cannot be empty".to_string()));
        }
        if !rule.has_valid_cooldown() {
            return Err(StoreError::InvalidRule(format!(
                "cooldown_seconds must be between 0 and {}, got {}",
                MAX_COOLDOWN_SECS, rule.cooldown_seconds
            )));
        }

        // Edits made from a stale read must not rewind the cooldown
        match self.rules.entry(rule.id.clone()) {
            Entry::Occupied(mut entry) => {
                let mut rule = rule;
                if entry.get().last_triggered_at > rule.last_triggered_at {
                    rule.last_triggered_at = entry.get().last_triggered_at;
                }
                Ok(Some(entry.insert(rule)))
            }
            Entry::Vacant(entry) => {
                entry.insert(rule);
                Ok(None)
            }
        }
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StoreError> {
        let mut rule = self
            .rules
            .get_mut(id)
            .ok_or_else(|| StoreError::RuleNotFound(id.to_string()))?;
        rule.enabled = enabled;
        Ok(())
    }

    async fn delete_rule(&self, id: &str) -> Result<AlertRule, StoreError> {
        self.rules
            .remove(id)
            .map(|(_, rule)| rule)
            .ok_or_else(|| StoreError::RuleNotFound(id.to_string()))
    }

    async fn update_last_triggered(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut rule = self
            .rules
            .get_mut(id)
            .ok_or_else(|| StoreError::RuleNotFound(id.to_string()))?;

        match rule.last_triggered_at {
            Some(previous) if previous > at => {
                tracing::debug!(
                    rule_id = %id,
                    previous = %previous,
                    attempted = %at,
                    "Ignoring last_triggered_at update that would move backwards"
                );
            }
            _ => rule.last_triggered_at = Some(at),
        }
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn insert_incident(&self, incident: NewIncident) -> Result<Incident, StoreError> {
        let seq = self.next_incident_id.fetch_add(1, Ordering::SeqCst);
        let incident = Incident::from_new(format!("inc-{}", seq), incident);
        self.incidents.insert(incident.id.clone(), incident.clone());
        Ok(incident)
    }

    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, StoreError> {
        let mut incidents: Vec<Incident> = self
            .incidents
            .iter()
            .filter(|i| filter.matches(i.value()))
            .map(|i| i.value().clone())
            .collect();

        sort_for_display(&mut incidents);

        if let Some(limit) = filter.limit {
            incidents.truncate(limit);
        }
        Ok(incidents)
    }

    async fn mark_alert_sent(&self, id: &str) -> Result<(), StoreError> {
        let mut incident = self
            .incidents
            .get_mut(id)
            .ok_or_else(|| StoreError::IncidentNotFound(id.to_string()))?;
        incident.alert_sent = true;
        Ok(())
    }

    async fn resolve_stale(
        &self,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
        resolution: &str,
    ) -> Result<usize, StoreError> {
        let mut closed = 0;
        for mut entry in self.incidents.iter_mut() {
            let incident = entry.value_mut();
            if incident.status.is_active() && incident.start_time < started_before {
                incident.resolve(now, resolution);
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn purge_resolved(&self, ended_before: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.incidents.len();
        self.incidents.retain(|_, incident| {
            !(incident.status == IncidentStatus::Resolved
                && incident.end_time.map(|end| end < ended_before).unwrap_or(false))
        });
        Ok(before - self.incidents.len())
    }
}

#[async_trait]
impl GenerationLogStore for MemoryStore {
    async fn insert_generation_log(&self, log: GenerationLog) -> Result<(), StoreError> {
        let mut logs = self.generation_logs.write();
        let pos = logs
            .iter()
            .rposition(|l| l.created_at <= log.created_at)
            .map(|i| i + 1)
            .unwrap_or(0);
        logs.insert(pos, log);

        while logs.len() > self.max_generation_logs {
            logs.pop_front();
        }
        Ok(())
    }

    async fn generation_logs_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<GenerationLog>, StoreError> {
        Ok(self
            .generation_logs
            .read()
            .iter()
            .filter(|l| l.created_at >= since)
            .cloned()
            .collect())
    }
}
