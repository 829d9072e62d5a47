//! Telemetry Aggregator
//!
//! Folds raw samples into dashboard views. Everything is recomputed from the
//! stores on each call; empty collections produce zeroed aggregates.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::alerts::{self, Alert, AlertLevel};
use super::window::TimeWindow;
use crate::error::ApiResult;
use crate::models::{
    DataUsageSnapshot, NetworkConfig, NetworkStatus, SessionAnalytics, SpeedTest, SystemMetrics,
};
use crate::registry::NetworkRegistry;
use crate::store::{SessionStatusCounts, SessionStore, TelemetryStore};

/// Hourly trend buckets covering the trailing day
pub const TREND_BUCKETS: usize = 24;

/// A network with no sample newer than this is reported offline
pub const ONLINE_GRACE_SECS: i64 = 5 * 60;

// ============================================================================
// View types
// ============================================================================

/// Per-metric figures (used for both averages and peaks)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricFigures {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub temperature: f64,
    pub disk_usage: f64,
    pub active_users: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendBucket {
    pub start: DateTime<Utc>,
    pub samples: usize,
    #[serde(flatten)]
    pub average: MetricFigures,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemOverview {
    pub network_id: String,
    pub window: TimeWindow,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub current: Option<SystemMetrics>,
    pub sample_count: usize,
    pub averages: MetricFigures,
    pub peaks: MetricFigures,
    pub total_bytes_in: u64,
    pub total_bytes_out: u64,
    pub trend: Vec<TrendBucket>,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedSummary {
    pub network_id: String,
    pub window: TimeWindow,
    pub latest: Option<SpeedTest>,
    pub test_count: usize,
    pub avg_download_mbps: f64,
    pub peak_download_mbps: f64,
    pub avg_upload_mbps: f64,
    pub peak_upload_mbps: f64,
    pub avg_latency_ms: f64,
    pub best_latency_ms: f64,
    pub history: Vec<SpeedTest>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub network_id: String,
    pub window: TimeWindow,
    pub snapshot_count: usize,
    pub total_bytes_in: u64,
    pub total_bytes_out: u64,
    pub total_bytes: u64,
    pub peak_unique_users: u32,
    pub series: Vec<DataUsageSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub network_id: String,
    pub window: TimeWindow,
    pub new_sessions: u64,
    pub revenue: f64,
    pub peak_active_sessions: u32,
    pub avg_duration_mins: f64,
    /// Live counts from the session store, independent of the window
    pub live: SessionStatusCounts,
    pub series: Vec<SessionAnalytics>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDashboard {
    pub network: NetworkConfig,
    pub system: SystemOverview,
    pub speed: SpeedSummary,
    pub usage: UsageSummary,
    pub sessions: SessionSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHealth {
    pub network_id: String,
    pub ssid: String,
    pub status: NetworkStatus,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub active_users: u32,
    pub alerts: usize,
    pub critical_alerts: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformOverview {
    pub generated_at: DateTime<Utc>,
    pub total_networks: usize,
    pub online_networks: usize,
    pub offline_networks: usize,
    pub total_alerts: usize,
    pub critical_alerts: usize,
    pub active_users: u64,
    pub networks: Vec<NetworkHealth>,
}

// ============================================================================
// Folding helpers
// ============================================================================

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn peak(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, f64::max)
}

fn averages(samples: &[SystemMetrics]) -> MetricFigures {
    MetricFigures {
        cpu_usage: mean(samples.iter().map(|m| m.cpu_usage)),
        memory_usage: mean(samples.iter().map(|m| m.memory_usage)),
        temperature: mean(samples.iter().map(|m| m.temperature)),
        disk_usage: mean(samples.iter().map(|m| m.disk_usage)),
        active_users: mean(samples.iter().map(|m| m.active_users as f64)),
    }
}

fn peaks(samples: &[SystemMetrics]) -> MetricFigures {
    MetricFigures {
        cpu_usage: peak(samples.iter().map(|m| m.cpu_usage)),
        memory_usage: peak(samples.iter().map(|m| m.memory_usage)),
        temperature: peak(samples.iter().map(|m| m.temperature)),
        disk_usage: peak(samples.iter().map(|m| m.disk_usage)),
        active_users: peak(samples.iter().map(|m| m.active_users as f64)),
    }
}

fn is_online(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    last_seen.is_some_and(|ts| now - ts <= Duration::seconds(ONLINE_GRACE_SECS))
}

/// Split the trailing 24h before `now` into equal hourly buckets.
/// `samples` must already be restricted to that span.
fn hourly_trend(samples: &[SystemMetrics], now: DateTime<Utc>) -> Vec<TrendBucket> {
    let origin = now - Duration::hours(TREND_BUCKETS as i64);
    let mut grouped: Vec<Vec<SystemMetrics>> = vec![Vec::new(); TREND_BUCKETS];

    for sample in samples {
        let offset = (sample.timestamp - origin).num_seconds();
        if offset < 0 {
            continue;
        }
        let index = ((offset / 3600) as usize).min(TREND_BUCKETS - 1);
        grouped[index].push(sample.clone());
    }

    grouped
        .into_iter()
        .enumerate()
        .map(|(i, bucket)| TrendBucket {
            start: origin + Duration::hours(i as i64),
            samples: bucket.len(),
            average: averages(&bucket),
            bytes_in: bucket.iter().map(|m| m.bytes_in).fold(0, u64::saturating_add),
            bytes_out: bucket.iter().map(|m| m.bytes_out).fold(0, u64::saturating_add),
        })
        .collect()
}

// ============================================================================
// Aggregator
// ============================================================================

#[derive(Clone)]
pub struct TelemetryAggregator {
    telemetry: TelemetryStore,
    sessions: SessionStore,
    registry: NetworkRegistry,
}

impl TelemetryAggregator {
    pub fn new(telemetry: TelemetryStore, sessions: SessionStore, registry: NetworkRegistry) -> Self {
        Self {
            telemetry,
            sessions,
            registry,
        }
    }

    pub fn system_overview(
        &self,
        network_id: &str,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> ApiResult<SystemOverview> {
        self.registry.ensure_exists(network_id)?;

        let samples = self.telemetry.system_metrics(network_id, window.start, window.end)?;
        let day = TimeWindow::trailing(Duration::hours(TREND_BUCKETS as i64), now);
        let trend_samples = if window == day {
            samples.clone()
        } else {
            self.telemetry.system_metrics(network_id, day.start, day.end)?
        };

        let current = self.telemetry.latest_system(network_id)?;
        let last_seen = current.as_ref().map(|m| m.timestamp);
        let alerts = current.as_ref().map(alerts::evaluate).unwrap_or_default();

        Ok(SystemOverview {
            network_id: network_id.to_string(),
            window,
            online: is_online(last_seen, now),
            last_seen,
            sample_count: samples.len(),
            averages: averages(&samples),
            peaks: peaks(&samples),
            total_bytes_in: samples.iter().map(|m| m.bytes_in).fold(0, u64::saturating_add),
            total_bytes_out: samples.iter().map(|m| m.bytes_out).fold(0, u64::saturating_add),
            trend: hourly_trend(&trend_samples, now),
            alerts,
            current,
        })
    }

    pub fn speed_summary(&self, network_id: &str, window: TimeWindow) -> ApiResult<SpeedSummary> {
        self.registry.ensure_exists(network_id)?;

        let tests = self.telemetry.speed_tests(network_id, window.start, window.end)?;
        let best_latency = tests
            .iter()
            .map(|t| t.latency_ms)
            .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.min(v))))
            .unwrap_or(0.0);

        Ok(SpeedSummary {
            network_id: network_id.to_string(),
            window,
            latest: tests.last().cloned(),
            test_count: tests.len(),
            avg_download_mbps: mean(tests.iter().map(|t| t.download_mbps)),
            peak_download_mbps: peak(tests.iter().map(|t| t.download_mbps)),
            avg_upload_mbps: mean(tests.iter().map(|t| t.upload_mbps)),
            peak_upload_mbps: peak(tests.iter().map(|t| t.upload_mbps)),
            avg_latency_ms: mean(tests.iter().map(|t| t.latency_ms)),
            best_latency_ms: best_latency,
            history: tests,
        })
    }

    pub fn usage_summary(&self, network_id: &str, window: TimeWindow) -> ApiResult<UsageSummary> {
        self.registry.ensure_exists(network_id)?;

        let series = self.telemetry.data_usage(network_id, window.start, window.end)?;
        let total_bytes_in = series.iter().map(|s| s.bytes_in).fold(0, u64::saturating_add);
        let total_bytes_out = series.iter().map(|s| s.bytes_out).fold(0, u64::saturating_add);

        Ok(UsageSummary {
            network_id: network_id.to_string(),
            window,
            snapshot_count: series.len(),
            total_bytes_in,
            total_bytes_out,
            total_bytes: total_bytes_in.saturating_add(total_bytes_out),
            peak_unique_users: series.iter().map(|s| s.unique_users).max().unwrap_or(0),
            series,
        })
    }

    pub fn session_summary(&self, network_id: &str, window: TimeWindow) -> ApiResult<SessionSummary> {
        self.registry.ensure_exists(network_id)?;

        let series = self
            .telemetry
            .session_analytics(network_id, window.start, window.end)?;
        let live = self.sessions.count_by_status(network_id)?;

        Ok(SessionSummary {
            network_id: network_id.to_string(),
            window,
            new_sessions: series.iter().map(|a| a.new_sessions as u64).sum(),
            revenue: series.iter().map(|a| a.revenue).sum(),
            peak_active_sessions: series.iter().map(|a| a.active_sessions).max().unwrap_or(0),
            avg_duration_mins: mean(series.iter().map(|a| a.avg_duration_mins)),
            live,
            series,
        })
    }

    pub fn network_dashboard(
        &self,
        network_id: &str,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> ApiResult<NetworkDashboard> {
        let network = self.registry.get(network_id)?;

        Ok(NetworkDashboard {
            system: self.system_overview(network_id, window, now)?,
            speed: self.speed_summary(network_id, window)?,
            usage: self.usage_summary(network_id, window)?,
            sessions: self.session_summary(network_id, window)?,
            network,
        })
    }

    pub fn platform_overview(&self, now: DateTime<Utc>) -> ApiResult<PlatformOverview> {
        let mut networks = Vec::new();

        for network in self.registry.list()? {
            let latest = self.telemetry.latest_system(&network.network_id)?;
            let last_seen = latest.as_ref().map(|m| m.timestamp);
            let online = is_online(last_seen, now);
            let alerts = latest.as_ref().map(alerts::evaluate).unwrap_or_default();

            networks.push(NetworkHealth {
                online,
                last_seen,
                active_users: match &latest {
                    Some(m) if online => m.active_users,
                    _ => 0,
                },
                alerts: alerts.len(),
                critical_alerts: alerts
                    .iter()
                    .filter(|a| a.level == AlertLevel::Critical)
                    .count(),
                network_id: network.network_id,
                ssid: network.ssid,
                status: network.status,
            });
        }

        let online_networks = networks.iter().filter(|n| n.online).count();

        Ok(PlatformOverview {
            generated_at: now,
            total_networks: networks.len(),
            online_networks,
            offline_networks: networks.len() - online_networks,
            total_alerts: networks.iter().map(|n| n.alerts).sum(),
            critical_alerts: networks.iter().map(|n| n.critical_alerts).sum(),
            active_users: networks.iter().map(|n| n.active_users as u64).sum(),
            networks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::ApiError;
    use crate::models::{RollupPeriod, Session};
    use crate::registry::NetworkRegistration;
    use crate::store::NetworkStore;
    use serde_json::json;

    struct Fixture {
        aggregator: TelemetryAggregator,
        telemetry: TelemetryStore,
        sessions: SessionStore,
        registry: NetworkRegistry,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let registry = NetworkRegistry::new(NetworkStore::new(db.clone()), "https://ipfs.io");
        let telemetry = TelemetryStore::new(db.clone());
        let sessions = SessionStore::new(db);
        register(&registry, "1");
        Fixture {
            aggregator: TelemetryAggregator::new(telemetry.clone(), sessions.clone(), registry.clone()),
            telemetry,
            sessions,
            registry,
        }
    }

    fn register(registry: &NetworkRegistry, network_id: &str) {
        let request: NetworkRegistration = serde_json::from_value(json!({
            "networkId": network_id,
            "ssid": format!("Net-{}", network_id),
            "location": { "country": "Ghana", "city": "Accra" },
            "contact": { "ownerEmail": "host@example.com" },
            "hardware": { "deviceType": "raspberry-pi" },
            "price": 1.0,
            "hostWallet": "0x00000000000000000000000000000000000000aa"
        }))
        .unwrap();
        registry.register(request, Utc::now()).unwrap();
    }

    fn system(network_id: &str, at: DateTime<Utc>, cpu: f64) -> SystemMetrics {
        SystemMetrics {
            network_id: network_id.into(),
            timestamp: at,
            cpu_usage: cpu,
            memory_usage: 50.0,
            temperature: 60.0,
            disk_usage: 40.0,
            active_users: 2,
            bytes_in: 100,
            bytes_out: 300,
            uptime_secs: 10,
        }
    }

    fn day(now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::trailing(Duration::hours(24), now)
    }

    #[test]
    fn test_byte_totals_saturate() {
        let f = fixture();
        let now = Utc::now();
        for minutes in 1..=3 {
            let mut sample = system("1", now - Duration::minutes(minutes), 10.0);
            sample.bytes_in = i64::MAX as u64;
            f.telemetry.insert_system(&sample).unwrap();
        }

        let overview = f.aggregator.system_overview("1", day(now), now).unwrap();
        assert_eq!(overview.total_bytes_in, u64::MAX);
        assert_eq!(overview.total_bytes_out, 900);
        let bucket_bytes: u64 = overview.trend.iter().map(|b| b.bytes_in).max().unwrap();
        assert_eq!(bucket_bytes, u64::MAX);
    }

    #[test]
    fn test_empty_network_yields_zeroes() {
        let f = fixture();
        let now = Utc::now();

        let system = f.aggregator.system_overview("1", day(now), now).unwrap();
        assert!(!system.online);
        assert!(system.current.is_none());
        assert_eq!(system.sample_count, 0);
        assert_eq!(system.averages, MetricFigures::default());
        assert_eq!(system.peaks, MetricFigures::default());
        assert_eq!(system.trend.len(), TREND_BUCKETS);
        assert!(system.trend.iter().all(|b| b.samples == 0 && b.average.cpu_usage == 0.0));
        assert!(system.alerts.is_empty());

        let speed = f.aggregator.speed_summary("1", day(now)).unwrap();
        assert_eq!(speed.test_count, 0);
        assert_eq!(speed.best_latency_ms, 0.0);

        let usage = f.aggregator.usage_summary("1", day(now)).unwrap();
        assert_eq!(usage.total_bytes, 0);

        let sessions = f.aggregator.session_summary("1", day(now)).unwrap();
        assert_eq!(sessions.revenue, 0.0);
        assert_eq!(sessions.live.total(), 0);
    }

    #[test]
    fn test_system_averages_peaks_and_online() {
        let f = fixture();
        let now = Utc::now();
        f.telemetry.insert_system(&system("1", now - Duration::hours(3), 20.0)).unwrap();
        f.telemetry.insert_system(&system("1", now - Duration::minutes(2), 40.0)).unwrap();

        let overview = f.aggregator.system_overview("1", day(now), now).unwrap();
        assert!(overview.online);
        assert_eq!(overview.sample_count, 2);
        assert_eq!(overview.averages.cpu_usage, 30.0);
        assert_eq!(overview.peaks.cpu_usage, 40.0);
        assert_eq!(overview.total_bytes_out, 600);
        assert_eq!(overview.current.unwrap().cpu_usage, 40.0);

        let filled: usize = overview.trend.iter().map(|b| b.samples).sum();
        assert_eq!(filled, 2);
        assert_eq!(overview.trend[TREND_BUCKETS - 1].samples, 1);
        assert_eq!(overview.trend[TREND_BUCKETS - 1].average.cpu_usage, 40.0);
    }

    #[test]
    fn test_stale_sample_is_offline() {
        let f = fixture();
        let now = Utc::now();
        f.telemetry.insert_system(&system("1", now - Duration::minutes(6), 95.0)).unwrap();

        let overview = f.aggregator.system_overview("1", day(now), now).unwrap();
        assert!(!overview.online);
        assert_eq!(overview.alerts.len(), 1);
        assert_eq!(overview.alerts[0].level, AlertLevel::Critical);
    }

    #[test]
    fn test_trend_ignores_narrow_window() {
        let f = fixture();
        let now = Utc::now();
        f.telemetry.insert_system(&system("1", now - Duration::hours(5), 10.0)).unwrap();

        let window = TimeWindow::trailing(Duration::minutes(15), now);
        let overview = f.aggregator.system_overview("1", window, now).unwrap();
        assert_eq!(overview.sample_count, 0);
        assert_eq!(overview.trend.iter().map(|b| b.samples).sum::<usize>(), 1);
    }

    #[test]
    fn test_speed_summary() {
        let f = fixture();
        let now = Utc::now();
        for (i, (down, latency)) in [(50.0, 30.0), (70.0, 12.0), (60.0, 20.0)].into_iter().enumerate() {
            f.telemetry
                .insert_speed_test(&SpeedTest {
                    network_id: "1".into(),
                    timestamp: now - Duration::minutes(30 - i as i64),
                    download_mbps: down,
                    upload_mbps: 10.0,
                    latency_ms: latency,
                    jitter_ms: None,
                    device: None,
                })
                .unwrap();
        }

        let summary = f.aggregator.speed_summary("1", day(now)).unwrap();
        assert_eq!(summary.test_count, 3);
        assert_eq!(summary.avg_download_mbps, 60.0);
        assert_eq!(summary.peak_download_mbps, 70.0);
        assert_eq!(summary.best_latency_ms, 12.0);
        assert_eq!(summary.latest.unwrap().download_mbps, 60.0);
    }

    #[test]
    fn test_usage_and_session_summaries() {
        let f = fixture();
        let now = Utc::now();
        for users in [3, 9] {
            f.telemetry
                .insert_data_usage(&DataUsageSnapshot {
                    network_id: "1".into(),
                    timestamp: now - Duration::hours(1),
                    period: RollupPeriod::Hourly,
                    bytes_in: 1_000,
                    bytes_out: 500,
                    unique_users: users,
                })
                .unwrap();
            f.telemetry
                .insert_session_analytics(&SessionAnalytics {
                    network_id: "1".into(),
                    timestamp: now - Duration::hours(1),
                    period: RollupPeriod::Hourly,
                    total_sessions: 10,
                    active_sessions: users,
                    new_sessions: 2,
                    revenue: 1.25,
                    avg_duration_mins: 30.0 * users as f64 / 3.0,
                })
                .unwrap();
        }
        f.sessions
            .insert_if_absent(&Session::pending(1, "1", "0xabc", "tok", 1, "0", now))
            .unwrap();

        let usage = f.aggregator.usage_summary("1", day(now)).unwrap();
        assert_eq!(usage.total_bytes_in, 2_000);
        assert_eq!(usage.total_bytes, 3_000);
        assert_eq!(usage.peak_unique_users, 9);

        let sessions = f.aggregator.session_summary("1", day(now)).unwrap();
        assert_eq!(sessions.new_sessions, 4);
        assert_eq!(sessions.revenue, 2.5);
        assert_eq!(sessions.peak_active_sessions, 9);
        assert_eq!(sessions.avg_duration_mins, 60.0);
        assert_eq!(sessions.live.pending, 1);
    }

    #[test]
    fn test_dashboard_and_unknown_network() {
        let f = fixture();
        let now = Utc::now();
        let dashboard = f.aggregator.network_dashboard("1", day(now), now).unwrap();
        assert_eq!(dashboard.network.ssid, "Net-1");
        assert_eq!(dashboard.system.trend.len(), TREND_BUCKETS);

        assert!(matches!(
            f.aggregator.network_dashboard("404", day(now), now),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            f.aggregator.speed_summary("404", day(now)),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_platform_overview() {
        let f = fixture();
        register(&f.registry, "2");
        register(&f.registry, "3");
        let now = Utc::now();

        f.telemetry.insert_system(&system("1", now - Duration::minutes(1), 86.0)).unwrap();
        f.telemetry.insert_system(&system("2", now - Duration::minutes(1), 91.0)).unwrap();
        f.telemetry.insert_system(&system("3", now - Duration::hours(1), 10.0)).unwrap();

        let overview = f.aggregator.platform_overview(now).unwrap();
        assert_eq!(overview.total_networks, 3);
        assert_eq!(overview.online_networks, 2);
        assert_eq!(overview.offline_networks, 1);
        assert_eq!(overview.total_alerts, 2);
        assert_eq!(overview.critical_alerts, 1);
        assert_eq!(overview.active_users, 4);
    }
}
