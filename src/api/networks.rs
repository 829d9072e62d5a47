//! Network registration and lookup

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, put},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{json_body, AppState};
use crate::error::{ApiError, ApiResult};
use crate::models::{NetworkConfig, NetworkStatus};
use crate::registry::NetworkRegistration;

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NetworkListResponse {
    pub networks: Vec<NetworkConfig>,
    pub total: usize,
}

/// POST /networks
pub async fn register_network(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NetworkRegistration>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<NetworkConfig>)> {
    let request = json_body(body)?;
    let network = state.registry.register(request, Utc::now())?;
    Ok((StatusCode::CREATED, Json(network)))
}

/// GET /networks
pub async fn list_networks(State(state): State<Arc<AppState>>) -> ApiResult<Json<NetworkListResponse>> {
    let networks = state.registry.list()?;
    Ok(Json(NetworkListResponse {
        total: networks.len(),
        networks,
    }))
}

/// GET /networks/{networkId}
pub async fn get_network(
    State(state): State<Arc<AppState>>,
    Path(network_id): Path<String>,
) -> ApiResult<Json<NetworkConfig>> {
    Ok(Json(state.registry.get(&network_id)?))
}

/// PUT /networks/{networkId}/status
pub async fn update_network_status(
    State(state): State<Arc<AppState>>,
    Path(network_id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Json<NetworkConfig>> {
    let update = json_body(body)?;
    let status: NetworkStatus = update
        .status
        .as_deref()
        .ok_or_else(|| ApiError::validation("status", "status is required"))?
        .parse()
        .map_err(|e: String| ApiError::validation("status", e))?;

    Ok(Json(state.registry.update_status(&network_id, status, Utc::now())?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/networks", get(list_networks).post(register_network))
        .route("/networks/{network_id}", get(get_network))
        .route("/networks/{network_id}/status", put(update_network_status))
}
