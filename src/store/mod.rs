//! Persistence layer
//!
//! Thin, typed stores over the shared [`Database`](crate::db::Database):
//!
//! - `sessions`: session records and observed client IPs
//! - `metadata`: named key/value records (sync cursor)
//! - `networks`: registered network configurations
//! - `telemetry`: append-only metric time series

pub mod metadata;
pub mod networks;
pub mod sessions;
pub mod telemetry;

pub use metadata::MetadataStore;
pub use networks::NetworkStore;
pub use sessions::{SessionStatusCounts, SessionStore};
pub use telemetry::TelemetryStore;

use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Unix seconds → UTC timestamp
pub(crate) fn from_unix(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", secs)))
}

pub(crate) fn parse_enum<T>(raw: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse().map_err(StoreError::Corrupt)
}
