//! Evaluation cycle: snapshot + enabled rules -> incidents -> notifications

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::interval;

use super::config::AlertRule;
use super::cooldown;
use super::evaluator::{evaluate, observed_value};
use super::notifier::{AlertMessage, DispatchReport, Notifier};
use crate::incidents::IncidentRecorder;
use crate::metrics::MetricSnapshot;
use crate::storage::{IncidentStore, RuleRepository, SnapshotStore, StoreError};

/// Checker tuning
#[derive(Debug, Clone, Copy)]
pub struct CheckerConfig {
    /// Upper bound on every store call
    pub call_timeout: Duration,
    /// Consecutive cycles with persistence failures before escalating
    pub escalation_threshold: u32,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            escalation_threshold: 3,
        }
    }
}

/// Result of one side-effecting step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
    Skipped,
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// What the cycle decided for a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RuleDecision {
    NotTriggered,
    Suppressed { remaining_secs: i64 },
    Fired,
}

/// Everything that happened to one rule in a cycle
#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub rule_name: String,
    pub observed_value: Option<f64>,
    #[serde(flatten)]
    pub decision: RuleDecision,
    pub persist_trigger: StepOutcome,
    pub record_incident: StepOutcome,
    pub incident_id: Option<String>,
    /// Per-channel delivery, present only when the rule fired
    pub dispatch: Option<DispatchReport>,
}

impl RuleOutcome {
    fn new(rule: &AlertRule, observed_value: Option<f64>, decision: RuleDecision) -> Self {
        Self {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            observed_value,
            decision,
            persist_trigger: StepOutcome::Skipped,
            record_incident: StepOutcome::Skipped,
            incident_id: None,
            dispatch: None,
        }
    }

    fn has_persistence_failure(&self) -> bool {
        self.persist_trigger.is_failure() || self.record_incident.is_failure()
    }
}

/// Summary of one evaluation cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// Timestamp of the snapshot evaluated, `None` if there was none
    pub snapshot_at: Option<DateTime<Utc>>,
    pub rules_evaluated: usize,
    pub outcomes: Vec<RuleOutcome>,
    /// Set when the cycle could not load its inputs
    pub error: Option<String>,
}

impl CycleReport {
    fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            snapshot_at: None,
            rules_evaluated: 0,
            outcomes: Vec::new(),
            error: None,
        }
    }

    pub fn fired(&self) -> usize {
        self.count(|d| matches!(d, RuleDecision::Fired))
    }

    pub fn suppressed(&self) -> usize {
        self.count(|d| matches!(d, RuleDecision::Suppressed { .. }))
    }

    fn count(&self, pred: impl Fn(&RuleDecision) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.decision)).count()
    }
}

/// Checker errors
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs evaluation cycles, on demand or on an interval
pub struct AlertChecker {
    snapshots: Arc<dyn SnapshotStore>,
    rules: Arc<dyn RuleRepository>,
    recorder: IncidentRecorder,
    notifier: Arc<Notifier>,
    config: CheckerConfig,
    /// Serializes manual and scheduled cycles
    cycle_lock: tokio::sync::Mutex<()>,
    persistence_failures: AtomicU32,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl AlertChecker {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        rules: Arc<dyn RuleRepository>,
        incidents: Arc<dyn IncidentStore>,
        notifier: Arc<Notifier>,
        config: CheckerConfig,
    ) -> Self {
        Self {
            snapshots,
            rules,
            recorder: IncidentRecorder::new(incidents),
            notifier,
            config,
            cycle_lock: tokio::sync::Mutex::new(()),
            persistence_failures: AtomicU32::new(0),
            shutdown_tx: Mutex::new(None),
        }
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Cycles in a row that hit a persistence failure
    pub fn consecutive_persistence_failures(&self) -> u32 {
        self.persistence_failures.load(Ordering::SeqCst)
    }

    /// Start the background checker
    pub fn start(self: Arc<Self>, check_interval: Duration) -> tokio::task::JoinHandle<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        tokio::spawn(async move {
            tracing::info!("Alert checker started with interval {:?}", check_interval);
            let mut ticker = interval(check_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_cycle().await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Alert checker shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Stop the background checker
    pub async fn stop(&self) {
        let tx = self.shutdown_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(()).await;
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as of `now`. Never fails; problems land in the report.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let _guard = self.cycle_lock.lock().await;
        let mut report = CycleReport::empty(now);

        let snapshot = match self
            .timed("latest_snapshot", self.snapshots.latest_snapshot())
            .await
        {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::debug!("No metrics snapshot available, skipping alert check");
                return report;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load metrics snapshot");
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.snapshot_at = Some(snapshot.timestamp);

        let rules = match self
            .timed("list_enabled_rules", self.rules.list_enabled_rules())
            .await
        {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load alert rules");
                report.error = Some(e.to_string());
                return report;
            }
        };

        for rule in rules.iter().filter(|r| r.enabled) {
            report.rules_evaluated += 1;
            report
                .outcomes
                .push(self.process_rule(rule, &snapshot, now).await);
        }

        self.track_persistence(&report);

        tracing::info!(
            rules_evaluated = report.rules_evaluated,
            fired = report.fired(),
            suppressed = report.suppressed(),
            "Alert check completed"
        );
        report
    }

    /// Evaluate one rule and carry out its side effects
    pub async fn process_rule(
        &self,
        rule: &AlertRule,
        snapshot: &MetricSnapshot,
        now: DateTime<Utc>,
    ) -> RuleOutcome {
        let value = observed_value(rule, snapshot);

        if !evaluate(rule, snapshot) {
            if value.is_none() {
                tracing::debug!(rule_id = %rule.id, metric = %rule.metric, "Unknown metric, rule skipped");
            }
            return RuleOutcome::new(rule, value, RuleDecision::NotTriggered);
        }

        if let Some(left) = cooldown::remaining(rule, now) {
            tracing::debug!(
                rule_id = %rule.id,
                remaining_secs = left.num_seconds(),
                "Alert suppressed by cooldown"
            );
            return RuleOutcome::new(
                rule,
                value,
                RuleDecision::Suppressed {
                    remaining_secs: left.num_seconds(),
                },
            );
        }

        let mut outcome = RuleOutcome::new(rule, value, RuleDecision::Fired);
        tracing::warn!(
            rule_id = %rule.id,
            rule_name = %rule.name,
            metric = %rule.metric,
            value = ?value,
            threshold = rule.threshold,
            "Alert rule triggered"
        );

        // The trigger time must be stored before anything is sent
        let fired = cooldown::record_fired(rule, now);
        let fired_at = fired.last_triggered_at.unwrap_or(now);
        outcome.persist_trigger = match self
            .timed(
                "update_last_triggered",
                self.rules.update_last_triggered(&rule.id, fired_at),
            )
            .await
        {
            Ok(()) => StepOutcome::Succeeded,
            Err(e) => {
                tracing::error!(rule_id = %rule.id, error = %e, "Failed to persist last_triggered_at");
                StepOutcome::Failed(e.to_string())
            }
        };

        outcome.record_incident = match self
            .timed(
                "insert_incident",
                self.recorder.record_incident(rule, snapshot, now),
            )
            .await
        {
            Ok(incident) => {
                outcome.incident_id = Some(incident.id);
                StepOutcome::Succeeded
            }
            Err(e) => {
                tracing::error!(rule_id = %rule.id, error = %e, "Failed to record incident");
                StepOutcome::Failed(e.to_string())
            }
        };

        let alert = AlertMessage::from_rule(rule, value, now);
        let dispatch = self.notifier.dispatch(&alert).await;

        if dispatch.any_delivered() {
            if let Some(id) = &outcome.incident_id {
                if let Err(e) = self
                    .timed("mark_alert_sent", self.recorder.mark_alert_sent(id))
                    .await
                {
                    tracing::warn!(incident_id = %id, error = %e, "Failed to mark incident as alerted");
                }
            }
        }

        outcome.dispatch = Some(dispatch);
        outcome
    }

    fn track_persistence(&self, report: &CycleReport) {
        let failed = report.outcomes.iter().any(RuleOutcome::has_persistence_failure);
        if !failed {
            self.persistence_failures.store(0, Ordering::SeqCst);
            return;
        }

        let streak = self.persistence_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if streak >= self.config.escalation_threshold {
            tracing::error!(
                persistence_failure_escalation = true,
                consecutive_cycles = streak,
                "Alert state persistence keeps failing; cooldowns may not hold"
            );
        }
    }

    async fn timed<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, CheckError> {
        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(result) => result.map_err(CheckError::from),
            Err(_) => Err(CheckError::Timeout(op)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::config::{ComparisonOperator, RuleSeverity};
    use crate::alerts::notifier::testing::{Behavior, FakeChannel};
    use crate::alerts::Severity;
    use crate::incidents::{Incident, IncidentFilter, NewIncident};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    /// Wraps a [`MemoryStore`] and fails selected writes
    struct FlakyStore {
        inner: MemoryStore,
        fail_trigger_updates: bool,
        fail_incidents: bool,
        hang_rules: bool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_trigger_updates: false,
                fail_incidents: false,
                hang_rules: false,
            }
        }
    }

    #[async_trait]
    impl RuleRepository for FlakyStore {
        async fn list_rules(&self) -> Result<Vec<AlertRule>, StoreError> {
            self.inner.list_rules().await
        }

        async fn list_enabled_rules(&self) -> Result<Vec<AlertRule>, StoreError> {
            if self.hang_rules {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.inner.list_enabled_rules().await
        }

        async fn get_rule(&self, id: &str) -> Result<Option<AlertRule>, StoreError> {
            self.inner.get_rule(id).await
        }

        async fn upsert_rule(&self, rule: AlertRule) -> Result<Option<AlertRule>, StoreError> {
            self.inner.upsert_rule(rule).await
        }

        async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StoreError> {
            self.inner.set_enabled(id, enabled).await
        }

        async fn delete_rule(&self, id: &str) -> Result<AlertRule, StoreError> {
            self.inner.delete_rule(id).await
        }

        async fn update_last_triggered(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
            if self.fail_trigger_updates {
                return Err(StoreError::Unavailable("rules table locked".to_string()));
            }
            self.inner.update_last_triggered(id, at).await
        }
    }

    #[async_trait]
    impl IncidentStore for FlakyStore {
        async fn insert_incident(&self, incident: NewIncident) -> Result<Incident, StoreError> {
            if self.fail_incidents {
                return Err(StoreError::Unavailable("incidents table locked".to_string()));
            }
            self.inner.insert_incident(incident).await
        }

        async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, StoreError> {
            self.inner.list_incidents(filter).await
        }

        async fn mark_alert_sent(&self, id: &str) -> Result<(), StoreError> {
            self.inner.mark_alert_sent(id).await
        }

        async fn resolve_stale(
            &self,
            started_before: DateTime<Utc>,
            now: DateTime<Utc>,
            resolution: &str,
        ) -> Result<usize, StoreError> {
            self.inner.resolve_stale(started_before, now, resolution).await
        }

        async fn purge_resolved(&self, ended_before: DateTime<Utc>) -> Result<usize, StoreError> {
            self.inner.purge_resolved(ended_before).await
        }
    }

    #[async_trait]
    impl SnapshotStore for FlakyStore {
        async fn latest_snapshot(&self) -> Result<Option<MetricSnapshot>, StoreError> {
            self.inner.latest_snapshot().await
        }

        async fn insert_snapshot(&self, snapshot: MetricSnapshot) -> Result<(), StoreError> {
            self.inner.insert_snapshot(snapshot).await
        }

        async fn recent_snapshots(&self, limit: usize) -> Result<Vec<MetricSnapshot>, StoreError> {
            self.inner.recent_snapshots(limit).await
        }
    }

    fn success_rate_rule() -> AlertRule {
        AlertRule::new(
            "low-success",
            "Low success rate",
            "successRate",
            ComparisonOperator::LessThan,
            90.0,
        )
        .with_severity(RuleSeverity::Warning)
        .with_cooldown_secs(300)
    }

    fn checker_for<S>(store: Arc<S>, notifier: Notifier) -> AlertChecker
    where
        S: SnapshotStore + RuleRepository + IncidentStore + 'static,
    {
        AlertChecker::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(notifier),
            CheckerConfig::default(),
        )
    }

    async fn seeded_store(now: DateTime<Utc>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_snapshot(MetricSnapshot::new(now).with_success_rate(85.0))
            .await
            .unwrap();
        store.upsert_rule(success_rate_rule()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_end_to_end_fire() {
        let now = Utc::now();
        let store = seeded_store(now).await;
        let email = FakeChannel::new("email", Behavior::Succeed);
        let telegram = FakeChannel::new("telegram", Behavior::Succeed);
        let checker = checker_for(
            store.clone(),
            Notifier::new(Duration::from_secs(1))
                .with_channel(email.clone())
                .with_channel(telegram.clone()),
        );

        let report = checker.run_cycle_at(now).await;

        assert_eq!(report.rules_evaluated, 1);
        assert_eq!(report.fired(), 1);
        assert_eq!(email.calls(), 1);
        assert_eq!(telegram.calls(), 1);

        let incidents = store.list_incidents(&IncidentFilter::default()).await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].severity, Severity::Warning);
        assert_eq!(incidents[0].title, "Alert: Low success rate");
        assert!(incidents[0].alert_sent);

        let rule = store.get_rule("low-success").await.unwrap().unwrap();
        assert_eq!(rule.last_triggered_at, Some(now));

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.persist_trigger, StepOutcome::Succeeded);
        assert_eq!(outcome.record_incident, StepOutcome::Succeeded);
        assert_eq!(outcome.dispatch.as_ref().unwrap().get("email"), Some(true));
    }

    #[tokio::test]
    async fn test_refire_suppressed_within_cooldown() {
        let now = Utc::now();
        let store = seeded_store(now).await;
        let channel = FakeChannel::new("email", Behavior::Succeed);
        let checker = checker_for(
            store.clone(),
            Notifier::new(Duration::from_secs(1)).with_channel(channel.clone()),
        );

        checker.run_cycle_at(now).await;
        let report = checker
            .run_cycle_at(now + chrono::Duration::seconds(60))
            .await;

        assert_eq!(report.fired(), 0);
        assert_eq!(
            report.outcomes[0].decision,
            RuleDecision::Suppressed { remaining_secs: 240 }
        );
        assert_eq!(channel.calls(), 1);
        assert_eq!(store.incident_count(), 1);

        // Fires again once the cooldown has elapsed
        let report = checker
            .run_cycle_at(now + chrono::Duration::seconds(300))
            .await;
        assert_eq!(report.fired(), 1);
        assert_eq!(channel.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_snapshot_is_noop() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_rule(success_rate_rule()).await.unwrap();
        let channel = FakeChannel::new("email", Behavior::Succeed);
        let checker = checker_for(
            store.clone(),
            Notifier::new(Duration::from_secs(1)).with_channel(channel.clone()),
        );

        let report = checker.run_cycle().await;

        assert_eq!(report.rules_evaluated, 0);
        assert!(report.snapshot_at.is_none());
        assert!(report.error.is_none());
        assert_eq!(channel.calls(), 0);
        assert_eq!(store.incident_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_and_unknown_rules_do_not_fire() {
        let now = Utc::now();
        let store = seeded_store(now).await;
        store
            .upsert_rule(success_rate_rule().with_enabled(false))
            .await
            .unwrap();
        store
            .upsert_rule(AlertRule::new(
                "bogus",
                "Bogus",
                "nonexistentField",
                ComparisonOperator::GreaterThan,
                -1.0,
            ))
            .await
            .unwrap();
        let channel = FakeChannel::new("email", Behavior::Succeed);
        let checker = checker_for(
            store.clone(),
            Notifier::new(Duration::from_secs(1)).with_channel(channel.clone()),
        );

        let report = checker.run_cycle_at(now).await;

        assert_eq!(report.rules_evaluated, 1);
        assert_eq!(report.outcomes[0].rule_id, "bogus");
        assert_eq!(report.outcomes[0].decision, RuleDecision::NotTriggered);
        assert_eq!(channel.calls(), 0);
    }

    #[tokio::test]
    async fn test_channel_failure_isolated_in_cycle() {
        let now = Utc::now();
        let store = seeded_store(now).await;
        let broken = FakeChannel::new("email", Behavior::Error);
        let working = FakeChannel::new("telegram", Behavior::Succeed);
        let checker = checker_for(
            store.clone(),
            Notifier::new(Duration::from_secs(1))
                .with_channel(broken)
                .with_channel(working),
        );

        let report = checker.run_cycle_at(now).await;
        let dispatch = report.outcomes[0].dispatch.as_ref().unwrap();

        assert_eq!(dispatch.get("email"), Some(false));
        assert_eq!(dispatch.get("telegram"), Some(true));
    }

    #[tokio::test]
    async fn test_total_delivery_failure_leaves_alert_unsent() {
        let now = Utc::now();
        let store = seeded_store(now).await;
        let checker = checker_for(
            store.clone(),
            Notifier::new(Duration::from_secs(1))
                .with_channel(FakeChannel::new("email", Behavior::ReportFailure)),
        );

        checker.run_cycle_at(now).await;

        let incidents = store.list_incidents(&IncidentFilter::default()).await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert!(!incidents[0].alert_sent);
    }

    #[tokio::test]
    async fn test_persistence_failure_still_dispatches_and_escalates() {
        let now = Utc::now();
        let mut flaky = FlakyStore::new();
        flaky.fail_trigger_updates = true;
        flaky.fail_incidents = true;
        let store = Arc::new(flaky);
        store
            .insert_snapshot(MetricSnapshot::new(now).with_success_rate(85.0))
            .await
            .unwrap();
        store.upsert_rule(success_rate_rule()).await.unwrap();

        let channel = FakeChannel::new("email", Behavior::Succeed);
        let checker = checker_for(
            store.clone(),
            Notifier::new(Duration::from_secs(1)).with_channel(channel.clone()),
        );

        let report = checker.run_cycle_at(now).await;
        let outcome = &report.outcomes[0];
        assert!(outcome.persist_trigger.is_failure());
        assert!(outcome.record_incident.is_failure());
        assert!(outcome.incident_id.is_none());
        assert_eq!(channel.calls(), 1);
        assert_eq!(checker.consecutive_persistence_failures(), 1);

        checker.run_cycle_at(now).await;
        checker.run_cycle_at(now).await;
        assert_eq!(checker.consecutive_persistence_failures(), 3);
    }

    #[tokio::test]
    async fn test_clean_cycle_resets_failure_streak() {
        let now = Utc::now();
        let mut flaky = FlakyStore::new();
        flaky.fail_incidents = true;
        let store = Arc::new(flaky);
        store
            .insert_snapshot(MetricSnapshot::new(now).with_success_rate(85.0))
            .await
            .unwrap();
        store.upsert_rule(success_rate_rule()).await.unwrap();

        let checker = checker_for(store.clone(), Notifier::new(Duration::from_secs(1)));
        checker.run_cycle_at(now).await;
        assert_eq!(checker.consecutive_persistence_failures(), 1);

        // Metrics recover; nothing fires and nothing fails
        let later = now + chrono::Duration::minutes(1);
        store
            .insert_snapshot(MetricSnapshot::new(later).with_success_rate(99.0))
            .await
            .unwrap();
        let report = checker.run_cycle_at(later).await;
        assert_eq!(report.fired(), 0);
        assert_eq!(checker.consecutive_persistence_failures(), 0);
    }

    #[tokio::test]
    async fn test_oversized_cooldown_suppresses_without_panicking() {
        let now = Utc::now();
        let store = seeded_store(now).await;
        let channel = FakeChannel::new("email", Behavior::Succeed);
        let checker = Arc::new(checker_for(
            store,
            Notifier::new(Duration::from_secs(1)).with_channel(channel.clone()),
        ));
        let rule = success_rate_rule()
            .with_cooldown_secs(i64::MAX)
            .with_last_triggered(now - chrono::Duration::seconds(10));
        let snapshot = MetricSnapshot::new(now).with_success_rate(85.0);

        let outcome = tokio::spawn({
            let checker = Arc::clone(&checker);
            async move { checker.process_rule(&rule, &snapshot, now).await }
        })
        .await
        .unwrap();

        assert!(matches!(outcome.decision, RuleDecision::Suppressed { .. }));
        assert_eq!(channel.calls(), 0);
    }

    #[tokio::test]
    async fn test_each_rule_processed_independently() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_snapshot(
                MetricSnapshot::new(now)
                    .with_success_rate(85.0)
                    .with_error_rate(15.0),
            )
            .await
            .unwrap();
        store.upsert_rule(success_rate_rule()).await.unwrap();
        store
            .upsert_rule(AlertRule::new(
                "high-errors",
                "High error rate",
                "errorRate",
                ComparisonOperator::GreaterThan,
                10.0,
            ))
            .await
            .unwrap();

        let channel = FakeChannel::new("email", Behavior::Succeed);
        let checker = checker_for(
            store.clone(),
            Notifier::new(Duration::from_secs(1)).with_channel(channel.clone()),
        );

        let report = checker.run_cycle_at(now).await;
        assert_eq!(report.fired(), 2);
        assert_eq!(channel.calls(), 2);
        assert_eq!(store.incident_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout_reported() {
        let now = Utc::now();
        let mut flaky = FlakyStore::new();
        flaky.hang_rules = true;
        let store = Arc::new(flaky);
        store
            .insert_snapshot(MetricSnapshot::new(now).with_success_rate(85.0))
            .await
            .unwrap();

        let checker = checker_for(store, Notifier::new(Duration::from_secs(1)));
        let report = checker.run_cycle_at(now).await;

        assert_eq!(report.error.as_deref(), Some("list_enabled_rules timed out"));
        assert_eq!(report.rules_evaluated, 0);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let now = Utc::now();
        let store = seeded_store(now).await;
        let channel = FakeChannel::new("email", Behavior::Succeed);
        let checker = Arc::new(checker_for(
            store,
            Notifier::new(Duration::from_secs(1)).with_channel(channel.clone()),
        ));

        let handle = checker.clone().start(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(50)).await;
        checker.stop().await;
        handle.await.unwrap();

        // The first tick fires; later ticks are suppressed by the cooldown
        assert_eq!(channel.calls(), 1);
    }
}
