use axum::{
    routing::{get, post},
    Router,
};
use chrono::Utc;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    announce_maintenance, check_alerts, cleanup_incidents, create_incident, create_rule,
    delete_rule, disable_rule, enable_rule, force_health_check, get_metrics, get_rule,
    health_check, ingest_batch, ingest_generation, list_alerts, list_channels, list_incidents,
    list_rules, refresh_metrics, send_alert, send_status_update, test_channels, update_rule,
    AppState,
};
use crate::alerts::channels::{
    DisplayZone, EmailChannel, LogChannel, MessageStyle, TelegramChannel, WebhookChannel,
};
use crate::alerts::{default_rules, AlertChecker, CheckerConfig, NotificationChannel, Notifier};
use crate::health::{HealthMonitor, HealthProber, ProbeTarget};
use crate::incidents::{CleanupPolicy, CleanupWorker};
use crate::metrics::AggregationWorker;
use crate::storage::persistence::{AutosaveWorker, PersistenceConfig, StateManager};
use crate::storage::{MemoryStore, RuleRepository};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory for the state file; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    pub check_interval_secs: u64,
    pub aggregation_interval_secs: u64,
    /// Trailing window each snapshot covers
    pub aggregation_window_secs: u64,
    pub cleanup_interval_secs: u64,
    pub autosave_interval_secs: u64,
    pub health_interval_secs: u64,
    pub channel_timeout_secs: u64,
    pub escalation_threshold: u32,
    pub dashboard_url: String,
    pub probe_targets: Vec<ProbeTarget>,
    pub display_zone: DisplayZone,
    /// Also write every alert to the log
    pub log_alerts: bool,
    /// Install the starter rules when no rules exist
    pub seed_default_rules: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            data_dir: None,
            check_interval_secs: 60,
            aggregation_interval_secs: 60,
            aggregation_window_secs: 3600,
            cleanup_interval_secs: 3600,
            autosave_interval_secs: 60,
            health_interval_secs: 60,
            channel_timeout_secs: 10,
            escalation_threshold: 3,
            dashboard_url: "http://localhost:8080".to_string(),
            probe_targets: Vec::new(),
            display_zone: DisplayZone::utc(),
            log_alerts: false,
            seed_default_rules: true,
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Metrics
        .route("/api/metrics", get(get_metrics).post(ingest_generation))
        .route("/api/metrics/batch", post(ingest_batch))
        .route("/api/metrics/refresh", post(refresh_metrics))
        // Incidents
        .route("/api/incidents", get(list_incidents).post(create_incident))
        .route("/api/incidents/cleanup", post(cleanup_incidents))
        // Alerts
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/send", post(send_alert))
        .route("/api/alerts/rules", get(list_rules).post(create_rule))
        .route(
            "/api/alerts/rules/:id",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route("/api/alerts/rules/:id/enable", post(enable_rule))
        .route("/api/alerts/rules/:id/disable", post(disable_rule))
        // Actions
        .route("/api/actions/check-alerts", post(check_alerts))
        .route("/api/actions/test-channels", post(test_channels))
        .route("/api/actions/force-health-check", post(force_health_check))
        .route("/api/actions/maintenance", post(announce_maintenance))
        .route("/api/actions/status-update", post(send_status_update))
        .route("/api/channels", get(list_channels))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Assemble the notifier from environment-configured channels
async fn build_notifier(config: &ServerConfig) -> Notifier {
    let style = MessageStyle::new("Healthdash", config.dashboard_url.clone())
        .with_zone(config.display_zone.clone());

    let email = Arc::new(EmailChannel::from_env(style.clone()));
    let telegram = Arc::new(TelegramChannel::from_env(style));
    if telegram.is_enabled() {
        if let Err(e) = telegram.register_commands().await {
            tracing::warn!(error = %e, "Failed to register Telegram bot commands");
        }
    }

    let mut notifier = Notifier::new(Duration::from_secs(config.channel_timeout_secs))
        .with_channel(email)
        .with_channel(telegram);
    if let Some(webhook) = WebhookChannel::from_env() {
        notifier = notifier.with_channel(Arc::new(webhook));
    }
    if config.log_alerts {
        notifier = notifier.with_channel(Arc::new(LogChannel));
    }

    tracing::info!(
        enabled = ?notifier.enabled_channels(),
        "Notification channels configured"
    );
    notifier
}

/// Background workers owned by the server
struct Workers {
    checker: Arc<AlertChecker>,
    aggregation: Arc<AggregationWorker>,
    cleanup: Arc<CleanupWorker>,
    autosave: Option<Arc<AutosaveWorker>>,
    health: Option<Arc<HealthMonitor>>,
}

impl Workers {
    async fn stop(&self) {
        self.checker.stop().await;
        self.aggregation.stop();
        self.cleanup.stop();
        if let Some(autosave) = &self.autosave {
            autosave.stop();
        }
        if let Some(health) = &self.health {
            health.stop();
        }
    }
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());

    // Restore persisted state
    let state_manager = match &config.data_dir {
        Some(dir) => {
            let persistence =
                PersistenceConfig::new(dir).with_save_interval(config.autosave_interval_secs);
            let save_interval = Duration::from_secs(persistence.save_interval_secs);
            let manager = Arc::new(StateManager::new(persistence)?);
            match manager.restore(&store) {
                Ok(Some(metadata)) => tracing::info!(
                    rules = metadata.rules,
                    incidents = metadata.incidents,
                    "Restored state from {}",
                    dir.display()
                ),
                Ok(None) => tracing::info!("No saved state in {}", dir.display()),
                Err(e) => tracing::error!(error = %e, "Failed to restore state, starting empty"),
            }
            Some((manager, save_interval))
        }
        None => {
            tracing::info!("Persistence disabled, state is kept in memory only");
            None
        }
    };

    if config.seed_default_rules && store.rule_count() == 0 {
        for rule in default_rules() {
            store.upsert_rule(rule).await?;
        }
        tracing::info!(rules = store.rule_count(), "Installed default alert rules");
    }

    let notifier = Arc::new(build_notifier(&config).await);

    let checker = Arc::new(AlertChecker::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::clone(&notifier),
        CheckerConfig {
            call_timeout: Duration::from_secs(config.channel_timeout_secs),
            escalation_threshold: config.escalation_threshold,
        },
    ));

    let aggregation_window = Duration::from_secs(config.aggregation_window_secs);
    let cleanup_policy = CleanupPolicy::default();

    // Start background workers
    let mut handles = Vec::new();
    handles.push(
        Arc::clone(&checker).start(Duration::from_secs(config.check_interval_secs)),
    );

    let aggregation = Arc::new(AggregationWorker::new(
        store.clone(),
        store.clone(),
        aggregation_window,
        Duration::from_secs(config.aggregation_interval_secs),
    ));
    handles.push(Arc::clone(&aggregation).start());

    let cleanup = Arc::new(CleanupWorker::new(
        store.clone(),
        cleanup_policy,
        Duration::from_secs(config.cleanup_interval_secs),
    ));
    handles.push(Arc::clone(&cleanup).start());

    let autosave = state_manager.map(|(manager, save_interval)| {
        Arc::new(AutosaveWorker::new(manager, Arc::clone(&store), save_interval))
    });
    if let Some(worker) = &autosave {
        handles.push(Arc::clone(worker).start());
    }

    let health = if config.probe_targets.is_empty() {
        None
    } else {
        let prober = HealthProber::new(config.probe_targets.clone())?;
        let monitor = Arc::new(HealthMonitor::new(prober, Arc::clone(&notifier)));
        handles.push(
            Arc::clone(&monitor).start(Duration::from_secs(config.health_interval_secs)),
        );
        Some(monitor)
    };

    // Initialize app state
    let state = Arc::new(AppState {
        store: Arc::clone(&store),
        checker: Arc::clone(&checker),
        notifier,
        health: health.clone(),
        cleanup_policy,
        aggregation_window,
        started_at: Utc::now(),
    });

    let workers = Workers {
        checker,
        aggregation,
        cleanup,
        autosave: autosave.clone(),
        health,
    };

    // Build router
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting Healthdash server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(workers))
        .await?;

    for handle in handles {
        handle.abort();
    }
    if let Some(worker) = autosave {
        worker.save_now();
    }

    tracing::info!("Healthdash server stopped");
    Ok(())
}

async fn shutdown_signal(workers: Workers) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown signal received, stopping workers...");
    workers.stop().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::notifier::testing::{Behavior, FakeChannel};
    use crate::alerts::{AlertRule, ComparisonOperator};
    use crate::metrics::MetricSnapshot;
    use crate::storage::SnapshotStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        channel: Arc<FakeChannel>,
    }

    fn create_test_app() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let channel = FakeChannel::new("fake", Behavior::Succeed);
        let notifier = Arc::new(
            Notifier::new(Duration::from_secs(1)).with_channel(channel.clone()),
        );
        let checker = Arc::new(AlertChecker::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::clone(&notifier),
            CheckerConfig::default(),
        ));
        let state = Arc::new(AppState {
            store: Arc::clone(&store),
            checker,
            notifier,
            health: None,
            cleanup_policy: CleanupPolicy::default(),
            aggregation_window: Duration::from_secs(3600),
            started_at: Utc::now(),
        });
        TestApp {
            router: build_router(state),
            store,
            channel,
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_test_app();

        let response = app.router.oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_create_and_list_rules() {
        let app = create_test_app();

        let rule = serde_json::json!({
            "name": "Low Success Rate",
            "metric": "successRate",
            "threshold": 90.0,
            "operator": "less_than",
            "severity": "critical"
        });
        let response = app
            .router
            .clone()
            .oneshot(post_json("POST", "/api/alerts/rules", rule.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["id"], "low-success-rate");
        assert_eq!(created["cooldown_seconds"], 300);

        // Same id again
        let response = app
            .router
            .clone()
            .oneshot(post_json("POST", "/api/alerts/rules", rule))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app.router.oneshot(get("/api/alerts/rules")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let rules = json_body(response).await;
        assert_eq!(rules.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rule_with_unknown_metric_rejected() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(post_json(
                "POST",
                "/api/alerts/rules",
                serde_json::json!({
                    "name": "CPU",
                    "metric": "cpu",
                    "threshold": 80.0,
                    "operator": "gt"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("Unknown metric"));
    }

    #[tokio::test]
    async fn test_rule_with_oversized_cooldown_rejected() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(post_json(
                "POST",
                "/api/alerts/rules",
                serde_json::json!({
                    "name": "Low Success Rate",
                    "metric": "successRate",
                    "threshold": 90.0,
                    "operator": "lt",
                    "cooldown_seconds": i64::MAX
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.store.rule_count(), 0);
    }

    #[tokio::test]
    async fn test_toggle_and_missing_rule() {
        let app = create_test_app();
        app.store
            .upsert_rule(AlertRule::new(
                "r1",
                "High error rate",
                "errorRate",
                ComparisonOperator::GreaterThan,
                5.0,
            ))
            .await
            .unwrap();

        let response = app
            .router
            .clone()
            .oneshot(post_json("POST", "/api/alerts/rules/r1/disable", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["enabled"], false);

        let response = app
            .router
            .oneshot(get("/api/alerts/rules/missing"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_check_alerts_fires_and_records_incident() {
        let app = create_test_app();
        app.store
            .upsert_rule(AlertRule::new(
                "low-success",
                "Low success rate",
                "successRate",
                ComparisonOperator::LessThan,
                90.0,
            ))
            .await
            .unwrap();
        app.store
            .insert_snapshot(MetricSnapshot::new(Utc::now()).with_success_rate(85.0))
            .await
            .unwrap();

        let response = app
            .router
            .clone()
            .oneshot(post_json("POST", "/api/actions/check-alerts", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["rules_evaluated"], 1);
        assert_eq!(report["outcomes"][0]["decision"], "fired");
        assert_eq!(report["outcomes"][0]["dispatch"]["fake"], true);
        assert_eq!(app.channel.calls(), 1);

        let response = app.router.oneshot(get("/api/alerts")).await.unwrap();
        let alerts = json_body(response).await;
        assert_eq!(alerts["active"].as_array().unwrap().len(), 1);
        assert_eq!(alerts["active"][0]["severity"], "warning");
        assert_eq!(alerts["active"][0]["alert_sent"], true);
    }

    #[tokio::test]
    async fn test_ingest_and_refresh_metrics() {
        let app = create_test_app();

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "POST",
                "/api/metrics/batch",
                serde_json::json!({
                    "metrics": [
                        {"processing_time_ms": 1200.0, "user_id": "u1"},
                        {"processing_time_ms": 800.0, "success": false, "user_id": "u2"},
                        {"processing_time_ms": -1.0}
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let batch = json_body(response).await;
        assert_eq!(batch["processed"], 2);
        assert_eq!(batch["errors"], 1);

        let response = app
            .router
            .clone()
            .oneshot(post_json("POST", "/api/metrics/refresh", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot = json_body(response).await;
        assert_eq!(snapshot["success_rate"], 50.0);
        assert_eq!(snapshot["active_users"], 2);

        let response = app.router.oneshot(get("/api/metrics")).await.unwrap();
        let metrics = json_body(response).await;
        assert_eq!(metrics["latest"]["error_rate"], 50.0);
    }

    #[tokio::test]
    async fn test_create_and_list_incidents() {
        let app = create_test_app();

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "POST",
                "/api/incidents",
                serde_json::json!({ "title": "Queue backlog" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let incident = json_body(response).await;
        assert_eq!(incident["service"], "manual");
        assert_eq!(incident["status"], "investigating");
        assert_eq!(incident["description"], "Manual incident: Queue backlog");

        let response = app
            .router
            .clone()
            .oneshot(post_json("POST", "/api/incidents", serde_json::json!({ "title": " " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.router.oneshot(get("/api/incidents?limit=5")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["incidents"].as_array().unwrap().len(), 1);
        assert_eq!(body["limit"], 5);
        assert_eq!(body["days"], 30);
    }

    #[tokio::test]
    async fn test_incident_lookback_is_bounded() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(get("/api/incidents?days=1000000000000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["days"], 3650);
    }

    #[tokio::test]
    async fn test_channels_and_manual_alert() {
        let app = create_test_app();

        let response = app
            .router
            .clone()
            .oneshot(post_json("POST", "/api/actions/test-channels", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["fake"], true);

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "POST",
                "/api/alerts/send",
                serde_json::json!({ "title": "Hello", "severity": "error" }),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["fake"], true);
        assert_eq!(app.channel.delivered.lock()[0].title, "Hello");

        let response = app.router.oneshot(get("/api/channels")).await.unwrap();
        let channels = json_body(response).await;
        assert_eq!(channels[0]["name"], "fake");
        assert_eq!(channels[0]["enabled"], true);
    }

    #[tokio::test]
    async fn test_force_health_check_without_targets() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(post_json(
                "POST",
                "/api/actions/force-health-check",
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
