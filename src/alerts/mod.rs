//! Threshold alerting
//!
//! Rules are evaluated against the latest metric snapshot, gated by a
//! per-rule cooldown, recorded as incidents and fanned out to notification
//! channels. [`AlertChecker`] drives the cycle.

pub mod channels;
pub mod checker;
pub mod config;
pub mod cooldown;
pub mod evaluator;
pub mod notifier;
pub mod templates;

pub use checker::{
    AlertChecker, CheckError, CheckerConfig, CycleReport, RuleDecision, RuleOutcome, StepOutcome,
};
pub use config::{
    default_rules, AlertRule, ComparisonOperator, RuleSeverity, Severity, DEFAULT_COOLDOWN_SECS,
    MAX_COOLDOWN_SECS,
};
pub use evaluator::evaluate;
pub use notifier::{
    AlertMessage, ChannelError, DispatchReport, DispatchResult, NotificationChannel, Notifier,
    DEFAULT_CHANNEL_TIMEOUT,
};
pub use templates::{StatusUpdate, SystemStatus};
