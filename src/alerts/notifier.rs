//! Fan-out of alerts to notification channels

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::config::{AlertRule, Severity};
use super::evaluator::describe_breach;
use super::templates::StatusUpdate;

/// Default upper bound on a single channel call
pub const DEFAULT_CHANNEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Structured alert payload handed to every channel.
///
/// Channels render it themselves; nothing here is pre-formatted for a
/// particular transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub service: String,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub current_value: Option<f64>,
    #[serde(default)]
    pub threshold: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl AlertMessage {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        service: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            service: service.into(),
            metric: None,
            current_value: None,
            threshold: None,
            timestamp: Utc::now(),
        }
    }

    /// Alert for a rule that fired with the observed `value`
    pub fn from_rule(rule: &AlertRule, value: Option<f64>, now: DateTime<Utc>) -> Self {
        Self {
            title: rule.name.clone(),
            message: describe_breach(rule, value),
            severity: rule.alert_severity(),
            service: "monitoring".to_string(),
            metric: Some(rule.metric.clone()),
            current_value: value,
            threshold: Some(rule.threshold),
            timestamp: now,
        }
    }

    pub fn with_metric(mut self, metric: impl Into<String>, current: f64, threshold: f64) -> Self {
        self.metric = Some(metric.into());
        self.current_value = Some(current);
        self.threshold = Some(threshold);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Outcome of one delivery attempt on one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub channel: String,
    pub delivered: bool,
}

/// Per-channel results of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DispatchReport {
    results: BTreeMap<String, bool>,
}

impl DispatchReport {
    pub fn from_results(results: impl IntoIterator<Item = DispatchResult>) -> Self {
        Self {
            results: results
                .into_iter()
                .map(|r| (r.channel, r.delivered))
                .collect(),
        }
    }

    pub fn get(&self, channel: &str) -> Option<bool> {
        self.results.get(channel).copied()
    }

    pub fn any_delivered(&self) -> bool {
        self.results.values().any(|delivered| *delivered)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn delivered_channels(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, delivered)| **delivered)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn failed_channels(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, delivered)| !**delivered)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn as_map(&self) -> &BTreeMap<String, bool> {
        &self.results
    }

    pub fn into_map(self) -> BTreeMap<String, bool> {
        self.results
    }
}

/// An outbound notification transport.
///
/// `Ok(false)` and `Err(_)` both count as a failed delivery; the error only
/// carries more detail for the log.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Stable name used as the key in dispatch results
    fn name(&self) -> &str;

    /// Channels without credentials report `false` and are skipped
    fn is_enabled(&self) -> bool {
        true
    }

    async fn deliver(&self, alert: &AlertMessage) -> Result<bool, ChannelError>;

    /// Probe the transport without delivering an alert
    async fn test_connection(&self) -> Result<bool, ChannelError>;

    /// Deliver a system status change. Defaults to delivering it as an alert.
    async fn send_status_update(&self, update: &StatusUpdate) -> Result<bool, ChannelError> {
        self.deliver(&update.to_alert()).await
    }
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rejected with status {status}: {description}")]
    Rejected { status: u16, description: String },
}

/// Dispatches alerts to every enabled channel
pub struct Notifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
    timeout: Duration,
}

impl Notifier {
    /// Create a notifier with no channels
    pub fn new(timeout: Duration) -> Self {
        Self {
            channels: Vec::new(),
            timeout,
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        if !channel.is_enabled() {
            tracing::warn!(channel = %channel.name(), "Notification channel not configured, skipping");
        }
        self.channels.push(channel);
        self
    }

    pub fn channels(&self) -> &[Arc<dyn NotificationChannel>] {
        &self.channels
    }

    /// Names of channels that will be used for dispatch
    pub fn enabled_channels(&self) -> Vec<&str> {
        self.channels
            .iter()
            .filter(|c| c.is_enabled())
            .map(|c| c.name())
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `alert` to every enabled channel
    pub async fn dispatch(&self, alert: &AlertMessage) -> DispatchReport {
        dispatch(alert, &self.channels, self.timeout).await
    }

    /// Send a system status change to every enabled channel
    pub async fn send_status_update(&self, update: &StatusUpdate) -> DispatchReport {
        let timeout = self.timeout;
        let attempts = self.channels.iter().filter(|c| c.is_enabled()).map(|channel| {
            let name = channel.name().to_string();
            let channel = Arc::clone(channel);
            let update = update.clone();
            let task = tokio::spawn(async move {
                tokio::time::timeout(timeout, channel.send_status_update(&update)).await
            });
            async move { settle(&name, task.await, timeout) }
        });

        let report = DispatchReport::from_results(join_all(attempts).await);
        log_report(&update.title(), &report);
        report
    }

    /// Probe every channel, including disabled ones
    pub async fn test_all(&self) -> BTreeMap<String, bool> {
        let timeout = self.timeout;
        let probes = self.channels.iter().map(|channel| {
            let name = channel.name().to_string();
            let channel = Arc::clone(channel);
            async move {
                if !channel.is_enabled() {
                    return (name, false);
                }
                let task = tokio::spawn(async move {
                    tokio::time::timeout(timeout, channel.test_connection()).await
                });
                let result = settle(&name, task.await, timeout);
                (result.channel, result.delivered)
            }
        });

        let results: BTreeMap<String, bool> = join_all(probes).await.into_iter().collect();
        tracing::info!(results = ?results, "Channel connection test finished");
        results
    }
}

/// Deliver `alert` on each enabled channel independently.
///
/// Each call runs in its own task bounded by `timeout`. An error, a timeout,
/// a panic or `false` on one channel is recorded and never stops the others.
pub async fn dispatch(
    alert: &AlertMessage,
    channels: &[Arc<dyn NotificationChannel>],
    timeout: Duration,
) -> DispatchReport {
    tracing::info!(
        severity = %alert.severity,
        title = %alert.title,
        service = %alert.service,
        "Sending alert"
    );

    let attempts = channels.iter().filter(|c| c.is_enabled()).map(|channel| {
        let name = channel.name().to_string();
        let channel = Arc::clone(channel);
        let alert = alert.clone();
        let task = tokio::spawn(async move {
            tokio::time::timeout(timeout, channel.deliver(&alert)).await
        });
        async move { settle(&name, task.await, timeout) }
    });

    let report = DispatchReport::from_results(join_all(attempts).await);
    log_report(&alert.title, &report);
    report
}

/// A channel call as seen from outside its task
type Attempt = Result<
    Result<Result<bool, ChannelError>, tokio::time::error::Elapsed>,
    tokio::task::JoinError,
>;

fn settle(channel: &str, attempt: Attempt, timeout: Duration) -> DispatchResult {
    let delivered = match attempt {
        Ok(Ok(Ok(true))) => true,
        Ok(Ok(Ok(false))) => {
            tracing::warn!(channel = %channel, "Channel reported delivery failure");
            false
        }
        Ok(Ok(Err(e))) => {
            tracing::warn!(channel = %channel, error = %e, "Channel delivery failed");
            false
        }
        Ok(Err(_)) => {
            tracing::warn!(channel = %channel, timeout = ?timeout, "Channel delivery timed out");
            false
        }
        Err(e) => {
            tracing::error!(channel = %channel, error = %e, "Channel task aborted");
            false
        }
    };

    DispatchResult {
        channel: channel.to_string(),
        delivered,
    }
}

fn log_report(title: &str, report: &DispatchReport) {
    if report.is_empty() {
        tracing::debug!(title = %title, "No notification channels enabled");
    } else if report.any_delivered() {
        tracing::info!(
            title = %title,
            delivered = ?report.delivered_channels(),
            failed = ?report.failed_channels(),
            "Alert sent"
        );
    } else {
        tracing::error!(
            title = %title,
            failed = ?report.failed_channels(),
            "Failed to send alert via any channel"
        );
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Behavior, FakeChannel};
    use super::*;
    use crate::alerts::config::ComparisonOperator;
    use crate::alerts::templates::SystemStatus;

    fn alert() -> AlertMessage {
        AlertMessage::new("Test", "Something happened", Severity::Warning, "system")
    }

    #[tokio::test]
    async fn test_partial_failure_isolated() {
        let a = FakeChannel::new("a", Behavior::Error);
        let b = FakeChannel::new("b", Behavior::Succeed);
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![a.clone(), b.clone()];

        let report = dispatch(&alert(), &channels, Duration::from_secs(1)).await;

        assert_eq!(report.get("a"), Some(false));
        assert_eq!(report.get("b"), Some(true));
        assert!(report.any_delivered());
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_panicking_channel_isolated() {
        let broken = FakeChannel::new("broken", Behavior::Panic);
        let healthy = FakeChannel::new("healthy", Behavior::Succeed);
        let notifier = Notifier::new(Duration::from_secs(1))
            .with_channel(broken.clone())
            .with_channel(healthy.clone());

        let report = notifier.dispatch(&alert()).await;
        assert_eq!(report.get("broken"), Some(false));
        assert_eq!(report.get("healthy"), Some(true));
        assert_eq!(healthy.calls(), 1);

        let update = StatusUpdate::new(SystemStatus::Major);
        let report = notifier.send_status_update(&update).await;
        assert_eq!(report.get("broken"), Some(false));
        assert_eq!(report.get("healthy"), Some(true));

        let results = notifier.test_all().await;
        assert_eq!(results.get("broken"), Some(&false));
        assert_eq!(results.get("healthy"), Some(&true));
    }

    #[tokio::test]
    async fn test_false_return_recorded() {
        let channels: Vec<Arc<dyn NotificationChannel>> =
            vec![FakeChannel::new("a", Behavior::ReportFailure)];
        let report = dispatch(&alert(), &channels, Duration::from_secs(1)).await;
        assert_eq!(report.get("a"), Some(false));
        assert!(!report.any_delivered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_channel_times_out() {
        let slow = FakeChannel::new("slow", Behavior::Hang);
        let fast = FakeChannel::new("fast", Behavior::Succeed);
        let notifier = Notifier::new(Duration::from_secs(5))
            .with_channel(slow)
            .with_channel(fast);

        let report = notifier.dispatch(&alert()).await;

        assert_eq!(report.get("slow"), Some(false));
        assert_eq!(report.get("fast"), Some(true));
    }

    #[tokio::test]
    async fn test_disabled_channel_skipped() {
        let off = FakeChannel::disabled("off");
        let on = FakeChannel::new("on", Behavior::Succeed);
        let notifier = Notifier::new(Duration::from_secs(1))
            .with_channel(off.clone())
            .with_channel(on);

        let report = notifier.dispatch(&alert()).await;

        assert_eq!(report.get("off"), None);
        assert_eq!(off.calls(), 0);
        assert_eq!(notifier.enabled_channels(), vec!["on"]);
    }

    #[tokio::test]
    async fn test_no_channels() {
        let notifier = Notifier::new(Duration::from_secs(1));
        let report = notifier.dispatch(&alert()).await;
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_status_update_uses_default_delivery() {
        let channel = FakeChannel::new("a", Behavior::Succeed);
        let notifier = Notifier::new(Duration::from_secs(1)).with_channel(channel.clone());

        let update = StatusUpdate::new(SystemStatus::Degraded).with_details("slow database");
        let report = notifier.send_status_update(&update).await;

        assert_eq!(report.get("a"), Some(true));
        let sent = channel.delivered.lock();
        assert_eq!(sent[0].severity, Severity::Warning);
        assert!(sent[0].message.contains("slow database"));
    }

    #[tokio::test]
    async fn test_test_all_reports_disabled_as_false() {
        let notifier = Notifier::new(Duration::from_secs(1))
            .with_channel(FakeChannel::disabled("email"))
            .with_channel(FakeChannel::new("telegram", Behavior::Succeed));

        let results = notifier.test_all().await;
        assert_eq!(results.get("email"), Some(&false));
        assert_eq!(results.get("telegram"), Some(&true));
    }

    #[test]
    fn test_alert_from_rule() {
        let rule = AlertRule::new(
            "r",
            "Low success rate",
            "successRate",
            ComparisonOperator::LessThan,
            90.0,
        );
        let now = Utc::now();
        let alert = AlertMessage::from_rule(&rule, Some(85.0), now);

        assert_eq!(alert.title, "Low success rate");
        assert_eq!(alert.service, "monitoring");
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(alert.current_value, Some(85.0));
        assert_eq!(alert.threshold, Some(90.0));
        assert_eq!(alert.message, "successRate threshold exceeded: 85 < 90");
    }
}
