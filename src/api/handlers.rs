use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::alerts::templates::maintenance;
use crate::alerts::{
    AlertChecker, AlertMessage, AlertRule, ComparisonOperator, CycleReport, DispatchReport,
    Notifier, RuleSeverity, Severity, StatusUpdate, MAX_COOLDOWN_SECS,
};
use crate::health::{HealthMonitor, HealthReport};
use crate::incidents::{
    run_cleanup, CleanupPolicy, CleanupReport, Incident, IncidentFilter, IncidentStatus,
    IncidentSummary, NewIncident,
};
use crate::metrics::{refresh_snapshot, GenerationLog, MetricSnapshot};
use crate::storage::{
    GenerationLogStore, IncidentStore, MemoryStore, RuleRepository, SnapshotStore, StoreError,
};

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub checker: Arc<AlertChecker>,
    pub notifier: Arc<Notifier>,
    pub health: Option<Arc<HealthMonitor>>,
    pub cleanup_policy: CleanupPolicy,
    pub aggregation_window: Duration,
    pub started_at: DateTime<Utc>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
    pub system: Option<HealthReport>,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        system: state.health.as_ref().and_then(|h| h.latest()),
    })
}

pub async fn force_health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthReport>, ApiError> {
    let monitor = state
        .health
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("No health probe targets configured".to_string()))?;
    Ok(Json(monitor.check_now().await))
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Deserialize)]
pub struct MetricsParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub latest: Option<MetricSnapshot>,
    pub recent: Vec<MetricSnapshot>,
}

pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MetricsParams>,
) -> Result<Json<MetricsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(60).min(1440);
    Ok(Json(MetricsResponse {
        latest: state.store.latest_snapshot().await?,
        recent: state.store.recent_snapshots(limit).await?,
    }))
}

/// A generation request as reported by the monitored application
#[derive(Deserialize)]
pub struct GenerationLogRequest {
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub generation_type: Option<String>,
    pub assistant_used: Option<String>,
    pub processing_time_ms: f64,
    #[serde(default = "default_true")]
    pub success: bool,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl GenerationLogRequest {
    fn into_log(self) -> Result<GenerationLog, ApiError> {
        if !self.processing_time_ms.is_finite() || self.processing_time_ms < 0.0 {
            return Err(ApiError::BadRequest(
                "processing_time_ms must be a non-negative number".to_string(),
            ));
        }

        let mut log = GenerationLog::new(
            self.processing_time_ms,
            self.success,
            self.created_at.unwrap_or_else(Utc::now),
        );
        log.request_id = self.request_id;
        log.user_id = self.user_id;
        if let Some(generation_type) = self.generation_type {
            log.generation_type = generation_type;
        }
        if let Some(assistant) = self.assistant_used {
            log.assistant_used = assistant;
        }
        log.error_type = self.error_type;
        log.error_message = self.error_message;
        Ok(log)
    }
}

pub async fn ingest_generation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerationLogRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let log = request.into_log()?;
    state.store.insert_generation_log(log).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "recorded": 1 }))))
}

#[derive(Deserialize)]
pub struct BatchRequest {
    pub metrics: Vec<GenerationLogRequest>,
}

#[derive(Serialize)]
pub struct BatchResponse {
    pub processed: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub error_details: Vec<String>,
}

pub async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    let mut response = BatchResponse {
        processed: 0,
        errors: 0,
        error_details: Vec::new(),
    };

    for (index, item) in request.metrics.into_iter().enumerate() {
        let result = match item.into_log() {
            Ok(log) => state
                .store
                .insert_generation_log(log)
                .await
                .map_err(ApiError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => response.processed += 1,
            Err(e) => {
                response.errors += 1;
                response.error_details.push(format!("item {}: {}", index, e));
            }
        }
    }

    tracing::info!(
        processed = response.processed,
        errors = response.errors,
        "Batch metrics processed"
    );
    Ok(Json(response))
}

/// Recompute the snapshot from the trailing window right now
pub async fn refresh_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MetricSnapshot>, ApiError> {
    let snapshot = refresh_snapshot(
        state.store.as_ref(),
        state.store.as_ref(),
        state.aggregation_window,
        Utc::now(),
    )
    .await?;
    Ok(Json(snapshot))
}

// ============================================================================
// Incidents
// ============================================================================

/// Widest incident lookback accepted by the list endpoint
const MAX_INCIDENT_DAYS: i64 = 3650;

#[derive(Deserialize)]
pub struct IncidentParams {
    pub limit: Option<usize>,
    pub days: Option<i64>,
    pub severity: Option<Severity>,
    pub status: Option<IncidentStatus>,
}

#[derive(Serialize)]
pub struct IncidentsResponse {
    pub incidents: Vec<Incident>,
    pub summary: IncidentSummary,
    pub limit: usize,
    pub days: i64,
}

pub async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IncidentParams>,
) -> Result<Json<IncidentsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(10);
    let days = params.days.unwrap_or(30).clamp(0, MAX_INCIDENT_DAYS);

    let filter = IncidentFilter {
        since: Some(Utc::now() - chrono::Duration::days(days)),
        severity: params.severity,
        statuses: params.status.map(|s| vec![s]),
        limit: None,
    };
    let mut incidents = state.store.list_incidents(&filter).await?;
    let summary = IncidentSummary::from_incidents(&incidents);
    incidents.truncate(limit);

    Ok(Json(IncidentsResponse {
        incidents,
        summary,
        limit,
        days,
    }))
}

#[derive(Deserialize)]
pub struct CreateIncidentRequest {
    pub title: String,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub service: Option<String>,
    pub status: Option<IncidentStatus>,
    #[serde(default)]
    pub affected_users: i64,
}

pub async fn create_incident(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateIncidentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title is required".to_string()));
    }

    let description = request
        .description
        .unwrap_or_else(|| format!("Manual incident: {}", request.title));
    let mut incident = NewIncident::new(
        request.severity.unwrap_or(Severity::Warning),
        request.service.unwrap_or_else(|| "manual".to_string()),
        request.title,
        description,
        Utc::now(),
    )
    .with_status(request.status.unwrap_or(IncidentStatus::Investigating));
    incident.affected_users = request.affected_users.max(0);

    let incident = state.store.insert_incident(incident).await?;
    tracing::info!(incident_id = %incident.id, "Incident created");
    Ok((StatusCode::CREATED, Json(incident)))
}

pub async fn cleanup_incidents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CleanupReport>, ApiError> {
    let report = run_cleanup(state.store.as_ref(), &state.cleanup_policy, Utc::now()).await?;
    Ok(Json(report))
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Deserialize)]
pub struct AlertParams {
    pub limit: Option<usize>,
    pub severity: Option<Severity>,
}

#[derive(Serialize)]
pub struct AlertsResponse {
    pub active: Vec<Incident>,
    pub summary: IncidentSummary,
    pub rules: Vec<AlertRule>,
    pub channels: Vec<ChannelInfo>,
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertParams>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let filter = IncidentFilter {
        severity: params.severity,
        ..IncidentFilter::active()
    };
    let mut active = state.store.list_incidents(&filter).await?;
    let summary = IncidentSummary::from_incidents(&active);
    active.truncate(params.limit.unwrap_or(10));

    Ok(Json(AlertsResponse {
        active,
        summary,
        rules: state.store.list_rules().await?,
        channels: channel_info(&state.notifier),
    }))
}

/// Payload for a manually sent alert
#[derive(Deserialize)]
pub struct SendAlertRequest {
    pub title: Option<String>,
    pub message: Option<String>,
    pub severity: Option<Severity>,
    pub service: Option<String>,
    pub metric: Option<String>,
    pub current_value: Option<f64>,
    pub threshold: Option<f64>,
}

impl SendAlertRequest {
    fn into_alert(self) -> AlertMessage {
        AlertMessage {
            title: self.title.unwrap_or_else(|| "Test Alert".to_string()),
            message: self
                .message
                .unwrap_or_else(|| "This is a test alert created from the dashboard".to_string()),
            severity: self.severity.unwrap_or(Severity::Info),
            service: self.service.unwrap_or_else(|| "test".to_string()),
            metric: self.metric,
            current_value: self.current_value,
            threshold: self.threshold,
            timestamp: Utc::now(),
        }
    }
}

pub async fn send_alert(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendAlertRequest>,
) -> Json<DispatchReport> {
    let alert = request.into_alert();
    Json(state.notifier.dispatch(&alert).await)
}

// ============================================================================
// Alert Rules
// ============================================================================

#[derive(Deserialize)]
pub struct RuleRequest {
    pub id: Option<String>,
    pub name: String,
    pub metric: String,
    pub threshold: f64,
    pub operator: ComparisonOperator,
    pub severity: Option<RuleSeverity>,
    pub enabled: Option<bool>,
    pub cooldown_seconds: Option<i64>,
}

impl RuleRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::BadRequest("Rule name is required".to_string()));
        }
        if !MetricSnapshot::is_known_metric(&self.metric) {
            return Err(ApiError::BadRequest(format!(
                "Unknown metric '{}', expected one of: {}",
                self.metric,
                crate::metrics::METRIC_NAMES.join(", ")
            )));
        }
        if !self.threshold.is_finite() {
            return Err(ApiError::BadRequest("Threshold must be a finite number".to_string()));
        }
        if let Some(cooldown) = self.cooldown_seconds {
            if !(0..=MAX_COOLDOWN_SECS).contains(&cooldown) {
                return Err(ApiError::BadRequest(format!(
                    "cooldown_seconds must be between 0 and {}",
                    MAX_COOLDOWN_SECS
                )));
            }
        }
        Ok(())
    }

    /// Apply onto `base`, keeping its id and trigger history
    fn apply(self, base: AlertRule) -> AlertRule {
        AlertRule {
            name: self.name,
            metric: self.metric,
            threshold: self.threshold,
            operator: self.operator,
            severity: self.severity.unwrap_or(base.severity),
            enabled: self.enabled.unwrap_or(base.enabled),
            cooldown_seconds: self.cooldown_seconds.unwrap_or(base.cooldown_seconds),
            ..base
        }
    }
}

/// `High Error Rate` -> `high-error-rate`
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

pub async fn list_rules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AlertRule>>, ApiError> {
    Ok(Json(state.store.list_rules().await?))
}

pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AlertRule>, ApiError> {
    state
        .store
        .get_rule(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Rule '{}' not found", id)))
}

pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RuleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;

    let id = match &request.id {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => slugify(&request.name),
    };
    if state.store.get_rule(&id).await?.is_some() {
        return Err(ApiError::Conflict(format!("Rule '{}' already exists", id)));
    }

    let base = AlertRule::new(id, "", "", request.operator, request.threshold);
    let rule = request.apply(base);
    state.store.upsert_rule(rule.clone()).await?;

    tracing::info!(rule_id = %rule.id, metric = %rule.metric, "Alert rule created");
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RuleRequest>,
) -> Result<Json<AlertRule>, ApiError> {
    request.validate()?;

    let existing = state
        .store
        .get_rule(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Rule '{}' not found", id)))?;
    let rule = request.apply(existing);
    state.store.upsert_rule(rule.clone()).await?;

    tracing::info!(rule_id = %rule.id, "Alert rule updated");
    Ok(Json(rule))
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.delete_rule(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

pub async fn enable_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AlertRule>, ApiError> {
    toggle_rule(&state, &id, true).await
}

pub async fn disable_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AlertRule>, ApiError> {
    toggle_rule(&state, &id, false).await
}

async fn toggle_rule(state: &AppState, id: &str, enabled: bool) -> Result<Json<AlertRule>, ApiError> {
    state.store.set_enabled(id, enabled).await?;
    state
        .store
        .get_rule(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Rule '{}' not found", id)))
}

// ============================================================================
// Actions
// ============================================================================

pub async fn check_alerts(State(state): State<Arc<AppState>>) -> Json<CycleReport> {
    Json(state.checker.run_cycle().await)
}

pub async fn test_channels(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, bool>> {
    Json(state.notifier.test_all().await)
}

#[derive(Deserialize)]
pub struct MaintenanceRequest {
    pub service: String,
    pub duration: String,
    pub start_time: Option<DateTime<Utc>>,
}

pub async fn announce_maintenance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MaintenanceRequest>,
) -> Result<Json<DispatchReport>, ApiError> {
    if request.service.trim().is_empty() || request.duration.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "service and duration are required".to_string(),
        ));
    }
    let alert = maintenance(
        &request.service,
        &request.duration,
        request.start_time.unwrap_or_else(Utc::now),
    );
    Ok(Json(state.notifier.dispatch(&alert).await))
}

pub async fn send_status_update(
    State(state): State<Arc<AppState>>,
    Json(update): Json<StatusUpdate>,
) -> Json<DispatchReport> {
    Json(state.notifier.send_status_update(&update).await)
}

// ============================================================================
// Channels
// ============================================================================

#[derive(Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub enabled: bool,
}

fn channel_info(notifier: &Notifier) -> Vec<ChannelInfo> {
    notifier
        .channels()
        .iter()
        .map(|c| ChannelInfo {
            name: c.name().to_string(),
            enabled: c.is_enabled(),
        })
        .collect()
}

pub async fn list_channels(State(state): State<Arc<AppState>>) -> Json<Vec<ChannelInfo>> {
    Json(channel_info(&state.notifier))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Internal(msg) => f.write_str(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RuleNotFound(_) | StoreError::IncidentNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            StoreError::InvalidRule(_) => ApiError::BadRequest(e.to_string()),
            StoreError::Unavailable(_) | StoreError::Persistence(_) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("High Error Rate"), "high-error-rate");
        assert_eq!(slugify("  p95 > 2s!! "), "p95-2s");
    }

    #[test]
    fn test_rule_request_validation() {
        let request = RuleRequest {
            id: None,
            name: "Bogus".to_string(),
            metric: "cpu".to_string(),
            threshold: 1.0,
            operator: ComparisonOperator::GreaterThan,
            severity: None,
            enabled: None,
            cooldown_seconds: None,
        };
        assert!(matches!(request.validate(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            ApiError::from(StoreError::RuleNotFound("x".to_string())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(StoreError::InvalidRule("x".to_string())),
            ApiError::BadRequest(_)
        ));
    }
}
