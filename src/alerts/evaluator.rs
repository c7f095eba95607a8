//! Rule evaluation against a metric snapshot

use super::config::AlertRule;
use crate::metrics::MetricSnapshot;

/// Whether the rule's condition holds for `snapshot`.
///
/// The caller is expected to have filtered out disabled rules. A metric the
/// snapshot does not know never fires. `Equal` compares floats exactly.
pub fn evaluate(rule: &AlertRule, snapshot: &MetricSnapshot) -> bool {
    match snapshot.metric(&rule.metric) {
        Some(value) => rule.operator.apply(value, rule.threshold),
        None => false,
    }
}

/// Value of the rule's metric on `snapshot`
pub fn observed_value(rule: &AlertRule, snapshot: &MetricSnapshot) -> Option<f64> {
    snapshot.metric(&rule.metric)
}

/// Human-readable description of a breach, e.g. `errorRate threshold exceeded: 6 > 5`
pub fn describe_breach(rule: &AlertRule, value: Option<f64>) -> String {
    let observed = value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{} threshold exceeded: {} {} {}",
        rule.metric,
        observed,
        rule.operator.symbol(),
        rule.threshold
    )
}
