//! Alert rule configuration types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default minimum interval between two fires of the same rule
pub const DEFAULT_COOLDOWN_SECS: i64 = 300;

/// Longest accepted cooldown: one year
pub const MAX_COOLDOWN_SECS: i64 = 365 * 24 * 60 * 60;

/// Severity carried by alerts and incidents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Critical => "🚨",
            Severity::Error => "❌",
            Severity::Warning => "⚠️",
            Severity::Info => "ℹ️",
        }
    }

    /// Accent color used by rich (HTML) renderings
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Critical => "#dc2626",
            Severity::Error => "#ef4444",
            Severity::Warning => "#f59e0b",
            Severity::Info => "#3b82f6",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severities a rule may be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    Warning,
    Error,
    Critical,
}

impl From<RuleSeverity> for Severity {
    fn from(severity: RuleSeverity) -> Self {
        match severity {
            RuleSeverity::Warning => Severity::Warning,
            RuleSeverity::Error => Severity::Error,
            RuleSeverity::Critical => Severity::Critical,
        }
    }
}

/// Comparison applied between the observed metric and the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    #[serde(alias = "gt")]
    GreaterThan,
    #[serde(alias = "lt")]
    LessThan,
    /// Exact floating-point equality, no tolerance
    #[serde(alias = "eq")]
    Equal,
}

impl ComparisonOperator {
    pub fn apply(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThan => value > threshold,
            ComparisonOperator::LessThan => value < threshold,
            ComparisonOperator::Equal => value == threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::Equal => "==",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => "greater_than",
            ComparisonOperator::LessThan => "less_than",
            ComparisonOperator::Equal => "equal",
        }
    }
}

/// Threshold rule over one snapshot metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique rule ID
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Metric name looked up on the snapshot
    pub metric: String,
    pub threshold: f64,
    pub operator: ComparisonOperator,
    pub severity: RuleSeverity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum seconds between two fires
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: i64,
    /// When the rule last fired; never moves backwards
    #[serde(default)]
    pub last_triggered_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

fn default_cooldown() -> i64 {
    DEFAULT_COOLDOWN_SECS
}

impl AlertRule {
    /// Create an enabled warning rule with the default cooldown
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        metric: impl Into<String>,
        operator: ComparisonOperator,
        threshold: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            metric: metric.into(),
            threshold,
            operator,
            severity: RuleSeverity::Warning,
            enabled: true,
            cooldown_seconds: DEFAULT_COOLDOWN_SECS,
            last_triggered_at: None,
        }
    }

    pub fn with_severity(mut self, severity: RuleSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_cooldown_secs(mut self, secs: i64) -> Self {
        self.cooldown_seconds = secs;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_last_triggered(mut self, at: DateTime<Utc>) -> Self {
        self.last_triggered_at = Some(at);
        self
    }

    /// Cooldown as a duration, clamped to `0..=MAX_COOLDOWN_SECS`
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_seconds.clamp(0, MAX_COOLDOWN_SECS))
    }

    /// Whether `cooldown_seconds` lies in the accepted range
    pub fn has_valid_cooldown(&self) -> bool {
        (0..=MAX_COOLDOWN_SECS).contains(&self.cooldown_seconds)
    }

    /// Severity of the alerts and incidents this rule produces
    pub fn alert_severity(&self) -> Severity {
        self.severity.into()
    }
}

/// Starter rules installed when the repository is empty
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            "response-time-warning",
            "Slow responses",
            "averageResponseTime",
            ComparisonOperator::GreaterThan,
            2000.0,
        ),
        AlertRule::new(
            "response-time-critical",
            "Very slow responses",
            "averageResponseTime",
            ComparisonOperator::GreaterThan,
            5000.0,
        )
        .with_severity(RuleSeverity::Critical),
        AlertRule::new(
            "success-rate-warning",
            "Low success rate",
            "successRate",
            ComparisonOperator::LessThan,
            95.0,
        ),
        AlertRule::new(
            "success-rate-critical",
            "Critical success rate",
            "successRate",
            ComparisonOperator::LessThan,
            90.0,
        )
        .with_severity(RuleSeverity::Critical),
        AlertRule::new(
            "error-rate-warning",
            "High error rate",
            "errorRate",
            ComparisonOperator::GreaterThan,
            5.0,
        ),
        AlertRule::new(
            "error-rate-critical",
            "Critical error rate",
            "errorRate",
            ComparisonOperator::GreaterThan,
            10.0,
        )
        .with_severity(RuleSeverity::Critical),
    ]
}
