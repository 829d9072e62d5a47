//! Session endpoints used by captive portals

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{json_body, query_params, AppState};
use crate::error::{ApiError, ApiResult};
use crate::models::Session;
use crate::validator::ValidatedSession;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(flatten)]
    pub result: ValidatedSession,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionListQuery {
    pub limit: Option<usize>,
    /// Restrict to the guest's active session
    pub guest: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub network_id: String,
    pub sessions: Vec<Session>,
}

/// Client address as reported by the reverse proxy
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or("unknown")
        .to_string()
}

/// POST /sessions/validate
pub async fn validate_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ValidateRequest>, JsonRejection>,
) -> ApiResult<Json<ValidateResponse>> {
    let request = json_body(body)?;
    let token = request
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::validation("token", "token is required"))?;

    let result = state
        .validator
        .validate(token.trim(), &client_ip(&headers), Utc::now())?;

    Ok(Json(ValidateResponse {
        valid: true,
        result,
    }))
}

/// GET /sessions/{sessionId}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Session>> {
    let id: u64 = session_id
        .parse()
        .map_err(|_| ApiError::validation("sessionId", "sessionId must be a non-negative integer"))?;

    state
        .sessions
        .get(id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("session".into()))
}

/// GET /networks/{networkId}/sessions
pub async fn list_network_sessions(
    State(state): State<Arc<AppState>>,
    Path(network_id): Path<String>,
    query: Result<Query<SessionListQuery>, QueryRejection>,
) -> ApiResult<Json<SessionListResponse>> {
    let query = query_params(query)?;

    let sessions = match query.guest.as_deref() {
        Some(guest) => state
            .sessions
            .find_active(&network_id, guest)?
            .into_iter()
            .collect(),
        None => {
            let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
            state.sessions.list_by_network(&network_id, limit)?
        }
    };

    Ok(Json(SessionListResponse {
        network_id,
        sessions,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions/validate", post(validate_session))
        .route("/sessions/{session_id}", get(get_session))
        .route("/networks/{network_id}/sessions", get(list_network_sessions))
}
