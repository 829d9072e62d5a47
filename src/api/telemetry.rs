//! Telemetry ingestion and dashboard endpoints

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use std::sync::Arc;

use super::{json_body, query_params, AppState};
use crate::error::ApiResult;
use crate::models::{DataUsageSnapshot, SessionAnalytics, SpeedTest, SystemMetrics};
use crate::telemetry::{
    NetworkDashboard, PlatformOverview, SessionAnalyticsSample, SessionSummary, SpeedSummary,
    SpeedTestSample, SystemOverview, SystemSample, TimeWindow, UsageSample, UsageSummary,
    WindowQuery,
};

// ===== Ingestion =====

/// POST /telemetry/{networkId}/system
pub async fn ingest_system(
    State(state): State<Arc<AppState>>,
    Path(network_id): Path<String>,
    body: Result<Json<SystemSample>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SystemMetrics>)> {
    let sample = json_body(body)?;
    let stored = state.ingest.record_system(&network_id, sample, Utc::now())?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// POST /telemetry/{networkId}/speedtest
pub async fn ingest_speed_test(
    State(state): State<Arc<AppState>>,
    Path(network_id): Path<String>,
    body: Result<Json<SpeedTestSample>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SpeedTest>)> {
    let sample = json_body(body)?;
    let stored = state.ingest.record_speed_test(&network_id, sample, Utc::now())?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// POST /telemetry/{networkId}/usage
pub async fn ingest_usage(
    State(state): State<Arc<AppState>>,
    Path(network_id): Path<String>,
    body: Result<Json<UsageSample>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DataUsageSnapshot>)> {
    let sample = json_body(body)?;
    let stored = state.ingest.record_usage(&network_id, sample, Utc::now())?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// POST /telemetry/{networkId}/sessions
pub async fn ingest_session_analytics(
    State(state): State<Arc<AppState>>,
    Path(network_id): Path<String>,
    body: Result<Json<SessionAnalyticsSample>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SessionAnalytics>)> {
    let sample = json_body(body)?;
    let stored = state
        .ingest
        .record_session_analytics(&network_id, sample, Utc::now())?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/telemetry/{network_id}/system", post(ingest_system))
        .route("/telemetry/{network_id}/speedtest", post(ingest_speed_test))
        .route("/telemetry/{network_id}/usage", post(ingest_usage))
        .route("/telemetry/{network_id}/sessions", post(ingest_session_analytics))
}

// ===== Dashboards =====

fn window(query: Result<Query<WindowQuery>, QueryRejection>) -> ApiResult<TimeWindow> {
    TimeWindow::resolve(&query_params(query)?, Utc::now())
}

/// GET /dashboard/overview
pub async fn platform_overview(State(state): State<Arc<AppState>>) -> ApiResult<Json<PlatformOverview>> {
    Ok(Json(state.aggregator.platform_overview(Utc::now())?))
}

/// GET /dashboard/{networkId}
pub async fn network_dashboard(
    State(state): State<Arc<AppState>>,
    Path(network_id): Path<String>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<Json<NetworkDashboard>> {
    let window = window(query)?;
    Ok(Json(state.aggregator.network_dashboard(&network_id, window, Utc::now())?))
}

/// GET /dashboard/{networkId}/system
pub async fn system_overview(
    State(state): State<Arc<AppState>>,
    Path(network_id): Path<String>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<Json<SystemOverview>> {
    let window = window(query)?;
    Ok(Json(state.aggregator.system_overview(&network_id, window, Utc::now())?))
}

/// GET /dashboard/{networkId}/speed
pub async fn speed_summary(
    State(state): State<Arc<AppState>>,
    Path(network_id): Path<String>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<Json<SpeedSummary>> {
    let window = window(query)?;
    Ok(Json(state.aggregator.speed_summary(&network_id, window)?))
}

/// GET /dashboard/{networkId}/usage
pub async fn usage_summary(
    State(state): State<Arc<AppState>>,
    Path(network_id): Path<String>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<Json<UsageSummary>> {
    let window = window(query)?;
    Ok(Json(state.aggregator.usage_summary(&network_id, window)?))
}

/// GET /dashboard/{networkId}/sessions
pub async fn session_summary(
    State(state): State<Arc<AppState>>,
    Path(network_id): Path<String>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<Json<SessionSummary>> {
    let window = window(query)?;
    Ok(Json(state.aggregator.session_summary(&network_id, window)?))
}

pub fn dashboard_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard/overview", get(platform_overview))
        .route("/dashboard/{network_id}", get(network_dashboard))
        .route("/dashboard/{network_id}/system", get(system_overview))
        .route("/dashboard/{network_id}/speed", get(speed_summary))
        .route("/dashboard/{network_id}/usage", get(usage_summary))
        .route("/dashboard/{network_id}/sessions", get(session_summary))
}
