//! Telemetry ingestion
//!
//! Collectors post one sample at a time. The network comes from the URL
//! path, the timestamp defaults to receipt time, and every sample is
//! range-checked before it is appended.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::models::{DataUsageSnapshot, RollupPeriod, SessionAnalytics, SpeedTest, SystemMetrics};
use crate::registry::NetworkRegistry;
use crate::store::TelemetryStore;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSample {
    pub timestamp: Option<DateTime<Utc>>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub temperature: f64,
    pub disk_usage: f64,
    #[serde(default)]
    pub active_users: u32,
    #[serde(default)]
    pub bytes_in: u64,
    #[serde(default)]
    pub bytes_out: u64,
    #[serde(default)]
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedTestSample {
    pub timestamp: Option<DateTime<Utc>>,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub latency_ms: f64,
    pub jitter_ms: Option<f64>,
    pub device: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSample {
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub period: RollupPeriod,
    pub bytes_in: u64,
    pub bytes_out: u64,
    #[serde(default)]
    pub unique_users: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAnalyticsSample {
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub period: RollupPeriod,
    pub total_sessions: u32,
    pub active_sessions: u32,
    #[serde(default)]
    pub new_sessions: u32,
    #[serde(default)]
    pub revenue: f64,
    #[serde(default)]
    pub avg_duration_mins: f64,
}

/// How far ahead of the server clock a collector timestamp may be
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

fn sample_time(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ApiResult<DateTime<Utc>> {
    match timestamp {
        Some(ts) if ts - now > Duration::seconds(MAX_CLOCK_SKEW_SECS) => Err(ApiError::validation(
            "timestamp",
            "timestamp is in the future",
        )),
        Some(ts) => Ok(ts),
        None => Ok(now),
    }
}

/// Counters are stored as SQLite INTEGER
fn counter(value: u64, field: &str) -> ApiResult<()> {
    if value <= i64::MAX as u64 {
        Ok(())
    } else {
        Err(ApiError::validation(field, format!("{} exceeds {}", field, i64::MAX)))
    }
}

fn percentage(value: f64, field: &str) -> ApiResult<()> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ApiError::validation(field, format!("{} must be between 0 and 100", field)))
    }
}

fn non_negative(value: f64, field: &str) -> ApiResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ApiError::validation(field, format!("{} must be a non-negative number", field)))
    }
}

#[derive(Clone)]
pub struct TelemetryIngest {
    store: TelemetryStore,
    registry: NetworkRegistry,
}

impl TelemetryIngest {
    pub fn new(store: TelemetryStore, registry: NetworkRegistry) -> Self {
        Self { store, registry }
    }

    pub fn record_system(
        &self,
        network_id: &str,
        sample: SystemSample,
        now: DateTime<Utc>,
    ) -> ApiResult<SystemMetrics> {
        self.registry.ensure_exists(network_id)?;
        percentage(sample.cpu_usage, "cpuUsage")?;
        percentage(sample.memory_usage, "memoryUsage")?;
        percentage(sample.disk_usage, "diskUsage")?;
        if !sample.temperature.is_finite() {
            return Err(ApiError::validation("temperature", "temperature must be a number"));
        }
        counter(sample.bytes_in, "bytesIn")?;
        counter(sample.bytes_out, "bytesOut")?;
        counter(sample.uptime_secs, "uptimeSecs")?;
        let timestamp = sample_time(sample.timestamp, now)?;

        let metrics = SystemMetrics {
            network_id: network_id.to_string(),
            timestamp,
            cpu_usage: sample.cpu_usage,
            memory_usage: sample.memory_usage,
            temperature: sample.temperature,
            disk_usage: sample.disk_usage,
            active_users: sample.active_users,
            bytes_in: sample.bytes_in,
            bytes_out: sample.bytes_out,
            uptime_secs: sample.uptime_secs,
        };
        self.store.insert_system(&metrics)?;
        debug!(network_id, cpu = metrics.cpu_usage, "Stored system sample");
        Ok(metrics)
    }

    pub fn record_speed_test(
        &self,
        network_id: &str,
        sample: SpeedTestSample,
        now: DateTime<Utc>,
    ) -> ApiResult<SpeedTest> {
        self.registry.ensure_exists(network_id)?;
        non_negative(sample.download_mbps, "downloadMbps")?;
        non_negative(sample.upload_mbps, "uploadMbps")?;
        non_negative(sample.latency_ms, "latencyMs")?;
        if let Some(jitter) = sample.jitter_ms {
            non_negative(jitter, "jitterMs")?;
        }
        let timestamp = sample_time(sample.timestamp, now)?;

        let test = SpeedTest {
            network_id: network_id.to_string(),
            timestamp,
            download_mbps: sample.download_mbps,
            upload_mbps: sample.upload_mbps,
            latency_ms: sample.latency_ms,
            jitter_ms: sample.jitter_ms,
            device: sample.device,
        };
        self.store.insert_speed_test(&test)?;
        debug!(network_id, download = test.download_mbps, "Stored speed test");
        Ok(test)
    }

    pub fn record_usage(
        &self,
        network_id: &str,
        sample: UsageSample,
        now: DateTime<Utc>,
    ) -> ApiResult<DataUsageSnapshot> {
        self.registry.ensure_exists(network_id)?;
        counter(sample.bytes_in, "bytesIn")?;
        counter(sample.bytes_out, "bytesOut")?;
        let timestamp = sample_time(sample.timestamp, now)?;

        let snapshot = DataUsageSnapshot {
            network_id: network_id.to_string(),
            timestamp,
            period: sample.period,
            bytes_in: sample.bytes_in,
            bytes_out: sample.bytes_out,
            unique_users: sample.unique_users,
        };
        self.store.insert_data_usage(&snapshot)?;
        debug!(network_id, period = snapshot.period.as_str(), "Stored usage snapshot");
        Ok(snapshot)
    }

    pub fn record_session_analytics(
        &self,
        network_id: &str,
        sample: SessionAnalyticsSample,
        now: DateTime<Utc>,
    ) -> ApiResult<SessionAnalytics> {
        self.registry.ensure_exists(network_id)?;
        non_negative(sample.revenue, "revenue")?;
        non_negative(sample.avg_duration_mins, "avgDurationMins")?;
        if sample.active_sessions > sample.total_sessions {
            return Err(ApiError::validation(
                "activeSessions",
                "activeSessions cannot exceed totalSessions",
            ));
        }
        let timestamp = sample_time(sample.timestamp, now)?;

        let analytics = SessionAnalytics {
            network_id: network_id.to_string(),
            timestamp,
            period: sample.period,
            total_sessions: sample.total_sessions,
            active_sessions: sample.active_sessions,
            new_sessions: sample.new_sessions,
            revenue: sample.revenue,
            avg_duration_mins: sample.avg_duration_mins,
        };
        self.store.insert_session_analytics(&analytics)?;
        debug!(network_id, period = analytics.period.as_str(), "Stored session analytics");
        Ok(analytics)
    }
}
