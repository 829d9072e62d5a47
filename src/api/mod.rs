//! HTTP API
//!
//! JSON endpoints under `/api`. Every handler shares one [`AppState`]
//! behind an `Arc`; the stores inside it are cheap clones of the same
//! database handle.

pub mod health;
pub mod networks;
pub mod sessions;
pub mod sync;
pub mod telemetry;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query,
    },
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;

use crate::db::Database;
use crate::error::{ApiError, ApiResult};
use crate::registry::NetworkRegistry;
use crate::store::{NetworkStore, SessionStore, TelemetryStore};
use crate::sync::EventSyncWorker;
use crate::telemetry::{TelemetryAggregator, TelemetryIngest};
use crate::token::SessionTokenSigner;
use crate::validator::TokenValidator;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub sessions: SessionStore,
    pub validator: TokenValidator,
    pub registry: NetworkRegistry,
    pub ingest: TelemetryIngest,
    pub aggregator: TelemetryAggregator,
    pub sync: Arc<EventSyncWorker>,
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub version: &'static str,
}

impl AppState {
    pub fn new(
        db: Database,
        signer: SessionTokenSigner,
        sync: Arc<EventSyncWorker>,
        ipfs_gateway: &str,
    ) -> Self {
        let sessions = SessionStore::new(db.clone());
        let telemetry = TelemetryStore::new(db.clone());
        let registry = NetworkRegistry::new(NetworkStore::new(db.clone()), ipfs_gateway);

        Self {
            validator: TokenValidator::new(signer, sessions.clone()),
            ingest: TelemetryIngest::new(telemetry.clone(), registry.clone()),
            aggregator: TelemetryAggregator::new(telemetry, sessions.clone(), registry.clone()),
            registry,
            sessions,
            sync,
            db,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Unwrap a JSON body, reporting malformed input as a validation error
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::validation("body", rejection.body_text()))
}

/// Unwrap query parameters, reporting malformed input as a validation error
pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::validation("query", rejection.body_text()))
}

/// Create the full API router
///
/// Routes (all under `/api`):
/// - GET  /health, /healthz, /readyz
/// - POST /sessions/validate
/// - GET  /sessions/{sessionId}
/// - GET  /networks/{networkId}/sessions
/// - POST /networks, GET /networks, GET /networks/{networkId}
/// - PUT  /networks/{networkId}/status
/// - POST /telemetry/{networkId}/{system|speedtest|usage|sessions}
/// - GET  /dashboard/overview
/// - GET  /dashboard/{networkId}[/system|/speed|/usage|/sessions]
/// - POST /sync
pub fn api_router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .merge(health::router())
        .merge(sessions::router())
        .merge(networks::router())
        .merge(telemetry::router())
        .merge(telemetry::dashboard_router())
        .merge(sync::router())
        .with_state(state);

    Router::new().nest("/api", routes)
}
