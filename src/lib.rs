//! ZaaNet Backend
//!
//! Session and telemetry service for the ZaaNet WiFi-sharing marketplace.
//!
//! # Features
//!
//! - **Event Sync**: follows `SessionStarted` events on the ledger and
//!   records each paid session with a signed access token
//! - **Token Validation**: starts a session's clock on first use and
//!   expires it once the paid duration has elapsed
//! - **Network Registry**: host network registration and lookup
//! - **Telemetry**: collector ingestion plus per-network and platform
//!   dashboard aggregates
//!
//! # Architecture
//!
//! ```text
//! Ledger (JSON-RPC) ──► EventSyncWorker ──► SessionStore ◄── TokenValidator ◄── captive portal
//!                                               │
//! collectors ──► TelemetryIngest ──► TelemetryStore ──► TelemetryAggregator ──► dashboards
//!                                               │
//!                                   Database (SQLite, WAL)
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod registry;
pub mod server;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod token;
pub mod validator;

pub use api::{api_router, AppState};
pub use config::Config;
pub use db::Database;
pub use error::{ApiError, ApiResult, LedgerError, StoreError};
pub use ledger::{InMemoryLedger, JsonRpcLedger, Ledger, SessionStartedEvent};
pub use models::{NetworkConfig, NetworkStatus, Session, SessionStatus};
pub use registry::{NetworkRegistration, NetworkRegistry};
pub use server::Server;
pub use store::{MetadataStore, NetworkStore, SessionStore, TelemetryStore};
pub use sync::{EventSyncWorker, SyncReport};
pub use telemetry::{TelemetryAggregator, TelemetryIngest, TimeWindow};
pub use token::{SessionClaims, SessionTokenSigner};
pub use validator::{TokenValidator, ValidatedSession};
