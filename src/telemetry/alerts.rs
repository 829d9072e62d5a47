//! Threshold alerts derived from a single system sample

use serde::Serialize;

use crate::models::SystemMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub metric: &'static str,
    pub level: AlertLevel,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

struct Threshold {
    metric: &'static str,
    label: &'static str,
    unit: &'static str,
    warning: f64,
    critical: Option<f64>,
    read: fn(&SystemMetrics) -> f64,
}

const THRESHOLDS: &[Threshold] = &[
    Threshold {
        metric: "cpuUsage",
        label: "CPU usage",
        unit: "%",
        warning: 85.0,
        critical: Some(90.0),
        read: |m| m.cpu_usage,
    },
    Threshold {
        metric: "memoryUsage",
        label: "Memory usage",
        unit: "%",
        warning: 90.0,
        critical: Some(95.0),
        read: |m| m.memory_usage,
    },
    Threshold {
        metric: "temperature",
        label: "Temperature",
        unit: "°C",
        warning: 70.0,
        critical: Some(80.0),
        read: |m| m.temperature,
    },
    Threshold {
        metric: "diskUsage",
        label: "Disk usage",
        unit: "%",
        warning: 85.0,
        critical: None,
        read: |m| m.disk_usage,
    },
];

/// Alerts for `sample`, at most one per metric at the highest level reached.
/// Thresholds are exclusive: a value equal to the limit does not fire.
pub fn evaluate(sample: &SystemMetrics) -> Vec<Alert> {
    THRESHOLDS
        .iter()
        .filter_map(|t| {
            let value = (t.read)(sample);
            let (level, threshold) = match t.critical {
                Some(critical) if value > critical => (AlertLevel::Critical, critical),
                _ if value > t.warning => (AlertLevel::Warning, t.warning),
                _ => return None,
            };
            Some(Alert {
                metric: t.metric,
                level,
                value,
                threshold,
                message: format!(
                    "{} at {:.1}{} exceeds {:.0}{}",
                    t.label, value, t.unit, threshold, t.unit
                ),
            })
        })
        .collect()
}
