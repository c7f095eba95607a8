//! Cooldown gate suppressing repeated fires of the same rule

use chrono::{DateTime, Utc};

use super::config::AlertRule;

/// Whether `rule` may fire at `now`.
///
/// True when the rule never fired, or at least `cooldown_seconds` have
/// elapsed since it last did.
pub fn may_fire(rule: &AlertRule, now: DateTime<Utc>) -> bool {
    match rule.last_triggered_at {
        None => true,
        Some(last) => now - last >= rule.cooldown(),
    }
}

/// Time left before `rule` may fire again, `None` if it may fire now
pub fn remaining(rule: &AlertRule, now: DateTime<Utc>) -> Option<chrono::Duration> {
    let last = rule.last_triggered_at?;
    let left = rule.cooldown() - (now - last);
    (left > chrono::Duration::zero()).then_some(left)
}

/// The rule as it looks after firing at `now`. Never moves the timestamp back.
pub fn record_fired(rule: &AlertRule, now: DateTime<Utc>) -> AlertRule {
    let mut fired = rule.clone();
    fired.last_triggered_at = Some(match rule.last_triggered_at {
        Some(last) if last > now => last,
        _ => now,
    });
    fired
}
