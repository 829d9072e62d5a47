//! Manual sync trigger for external schedulers

use axum::{extract::State, response::Json, routing::post, Router};
use chrono::Utc;
use std::sync::Arc;

use super::AppState;
use crate::error::ApiResult;
use crate::sync::SyncReport;

/// POST /sync
pub async fn trigger_sync(State(state): State<Arc<AppState>>) -> ApiResult<Json<SyncReport>> {
    Ok(Json(state.sync.sync_once(Utc::now()).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/sync", post(trigger_sync))
}
