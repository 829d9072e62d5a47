//! Domain records
//!
//! Sessions, network configurations and telemetry samples as they are
//! persisted and returned by the API. JSON uses camelCase to match what
//! collectors and captive portals send.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a paid session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Active,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "active" => Ok(SessionStatus::Active),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// Largest session ID the store can key on (SQLite INTEGER)
pub const MAX_SESSION_ID: u64 = i64::MAX as u64;

/// Longest accepted paid duration, in hours (100 years)
pub const MAX_DURATION_HOURS: i64 = 100 * 365 * 24;

/// A guest's paid, time-boxed access grant to one network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: u64,
    pub network_id: String,
    pub guest: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub duration_hours: i64,
    /// Paid amount in token base units (decimal string, may exceed u64)
    pub amount: String,
    pub start_time: Option<DateTime<Utc>>,
    pub active: bool,
    pub status: SessionStatus,
    pub observed_ips: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Fresh pending session as written by the sync worker
    pub fn pending(
        session_id: u64,
        network_id: impl Into<String>,
        guest: impl Into<String>,
        token: impl Into<String>,
        duration_hours: i64,
        amount: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            network_id: network_id.into(),
            guest: guest.into(),
            token: token.into(),
            duration_hours,
            amount: amount.into(),
            start_time: None,
            active: false,
            status: SessionStatus::Pending,
            observed_ips: BTreeSet::new(),
            created_at,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::try_hours(self.duration_hours.clamp(0, MAX_DURATION_HOURS)).unwrap_or_default()
    }

    /// `start_time + duration`, once the clock has started.
    ///
    /// Saturates at the latest representable instant.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.start_time.map(|start| {
            start
                .checked_add_signed(self.duration())
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }
}

/// Lifecycle status of a hosted network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    #[default]
    Active,
    Maintenance,
    Offline,
}

impl NetworkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkStatus::Active => "active",
            NetworkStatus::Maintenance => "maintenance",
            NetworkStatus::Offline => "offline",
        }
    }
}

impl FromStr for NetworkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(NetworkStatus::Active),
            "maintenance" => Ok(NetworkStatus::Maintenance),
            "offline" => Ok(NetworkStatus::Offline),
            other => Err(format!("unknown network status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub country: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub owner_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hardware {
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_model: Option<String>,
}

/// Descriptive record of a hosted network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub id: String,
    pub network_id: String,
    pub ssid: String,
    pub location: Location,
    pub contact: Contact,
    pub hardware: Hardware,
    pub price_per_hour: f64,
    /// IPFS content identifier; rewritten to a gateway URL on read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub status: NetworkStatus,
    pub host_wallet: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rollup granularity for usage and analytics snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RollupPeriod {
    #[default]
    Hourly,
    Daily,
}

impl RollupPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollupPeriod::Hourly => "hourly",
            RollupPeriod::Daily => "daily",
        }
    }
}

impl FromStr for RollupPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(RollupPeriod::Hourly),
            "daily" => Ok(RollupPeriod::Daily),
            other => Err(format!("unknown rollup period: {}", other)),
        }
    }
}

/// Point-in-time health sample reported by a network's collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub network_id: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub temperature: f64,
    pub disk_usage: f64,
    pub active_users: u32,
    pub bytes_in: u64,
    pub bytes_out: u64,
    #[serde(default)]
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedTest {
    pub network_id: String,
    pub timestamp: DateTime<Utc>,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub latency_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataUsageSnapshot {
    pub network_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub period: RollupPeriod,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub unique_users: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAnalytics {
    pub network_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub period: RollupPeriod,
    pub total_sessions: u32,
    pub active_sessions: u32,
    pub new_sessions: u32,
    pub revenue: f64,
    pub avg_duration_mins: f64,
}
