//! Network telemetry
//!
//! Ingestion of collector samples and the read-side aggregation that backs
//! the dashboards.

pub mod aggregator;
pub mod alerts;
pub mod ingest;
pub mod window;

pub use aggregator::{
    NetworkDashboard, PlatformOverview, SessionSummary, SpeedSummary, SystemOverview,
    TelemetryAggregator, UsageSummary,
};
pub use alerts::{Alert, AlertLevel};
pub use ingest::{SessionAnalyticsSample, SpeedTestSample, SystemSample, TelemetryIngest, UsageSample};
pub use window::{TimeWindow, WindowQuery};
