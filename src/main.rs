//! Healthdash Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - HEALTHDASH_HOST: Bind address (default: 0.0.0.0)
//! - HEALTHDASH_PORT: Port number (default: 8080)
//! - HEALTHDASH_DATA_DIR: Directory for the state file (default: in-memory only)
//! - HEALTHDASH_CHECK_INTERVAL_SECS: Alert evaluation interval (default: 60)
//! - HEALTHDASH_AGGREGATION_INTERVAL_SECS: Snapshot refresh interval (default: 60)
//! - HEALTHDASH_CLEANUP_INTERVAL_SECS: Incident cleanup interval (default: 3600)
//! - HEALTHDASH_CHANNEL_TIMEOUT_SECS: Per-call timeout for channels and stores (default: 10)
//! - HEALTHDASH_ESCALATION_THRESHOLD: Failed cycles before escalating (default: 3)
//! - HEALTHDASH_DASHBOARD_URL: Link embedded in notifications (default: http://localhost:8080)
//! - HEALTHDASH_PROBE_URLS: Comma-separated `name=url` health probe targets
//! - HEALTHDASH_LOG_ALERTS: Also write alerts to the log (default: false)
//! - HEALTHDASH_SEED_RULES: Install starter rules into an empty store (default: true)
//! - ALERT_TZ_OFFSET_MINUTES / ALERT_TZ_LABEL: Zone used for timestamps in messages (default: UTC)
//! - RUST_LOG: Log level (default: info)
//!
//! Channels:
//! - SMTP_HOST, SMTP_PORT, SMTP_USER, SMTP_PASS, ALERT_EMAIL_FROM, ALERT_EMAIL_TO
//! - TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, TELEGRAM_API_URL
//! - ALERT_WEBHOOK_URL
//!
//! A channel whose variables are missing is disabled.

use healthdash::alerts::channels::DisplayZone;
use healthdash::api::{run_server, ServerConfig};
use healthdash::health::ProbeTarget;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse `"api=http://a/health,db=http://b/health"`; a bare URL names itself
fn parse_probe_targets(raw: &str) -> Vec<ProbeTarget> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, url)) => ProbeTarget::new(name.trim(), url.trim()),
            None => ProbeTarget::new(entry, entry),
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "healthdash=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let defaults = ServerConfig::default();

    let display_zone = match std::env::var("ALERT_TZ_OFFSET_MINUTES")
        .ok()
        .and_then(|m| m.trim().parse::<i32>().ok())
    {
        Some(minutes) => DisplayZone::new(
            minutes,
            std::env::var("ALERT_TZ_LABEL").unwrap_or_else(|_| format!("UTC{:+}", minutes / 60)),
        ),
        None => DisplayZone::utc(),
    };

    let config = ServerConfig {
        host: std::env::var("HEALTHDASH_HOST").unwrap_or(defaults.host),
        port: env_or("HEALTHDASH_PORT", defaults.port),
        data_dir: std::env::var("HEALTHDASH_DATA_DIR").ok().map(Into::into),
        check_interval_secs: env_or("HEALTHDASH_CHECK_INTERVAL_SECS", defaults.check_interval_secs),
        aggregation_interval_secs: env_or(
            "HEALTHDASH_AGGREGATION_INTERVAL_SECS",
            defaults.aggregation_interval_secs,
        ),
        cleanup_interval_secs: env_or(
            "HEALTHDASH_CLEANUP_INTERVAL_SECS",
            defaults.cleanup_interval_secs,
        ),
        channel_timeout_secs: env_or(
            "HEALTHDASH_CHANNEL_TIMEOUT_SECS",
            defaults.channel_timeout_secs,
        ),
        escalation_threshold: env_or(
            "HEALTHDASH_ESCALATION_THRESHOLD",
            defaults.escalation_threshold,
        ),
        dashboard_url: std::env::var("HEALTHDASH_DASHBOARD_URL").unwrap_or(defaults.dashboard_url),
        probe_targets: std::env::var("HEALTHDASH_PROBE_URLS")
            .map(|raw| parse_probe_targets(&raw))
            .unwrap_or_default(),
        display_zone,
        log_alerts: env_or("HEALTHDASH_LOG_ALERTS", defaults.log_alerts),
        seed_default_rules: env_or("HEALTHDASH_SEED_RULES", defaults.seed_default_rules),
        ..defaults
    };

    tracing::info!("Healthdash configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    match &config.data_dir {
        Some(dir) => tracing::info!("  Data dir: {}", dir.display()),
        None => tracing::info!("  Data dir: none (in-memory)"),
    }
    tracing::info!(
        "  Alert check interval: {} seconds",
        config.check_interval_secs
    );
    tracing::info!(
        "  Channel timeout: {} seconds",
        config.channel_timeout_secs
    );
    tracing::info!("  Health probes: {}", config.probe_targets.len());
    for target in &config.probe_targets {
        tracing::info!("    - {} @ {}", target.name, target.url);
    }

    println!(
        r#"
  _    _            _ _   _         _           _
 | |  | |          | | | | |       | |         | |
 | |__| | ___  __ _| | |_| |__   __| | __ _ ___| |__
 |  __  |/ _ \/ _` | | __| '_ \ / _` |/ _` / __| '_ \
 | |  | |  __/ (_| | | |_| | | | (_| | (_| \__ \ | | |
 |_|  |_|\___|\__,_|_|\__|_| |_|\__,_|\__,_|___/_| |_|

 Health Dashboard Alerting
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
