//! Telemetry time series
//!
//! Four append-only collections, one per sample type. Range reads are
//! inclusive on both ends and return samples oldest first.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{from_unix, parse_enum};
use crate::db::Database;
use crate::error::StoreError;
use crate::models::{DataUsageSnapshot, SessionAnalytics, SpeedTest, SystemMetrics};

const SYSTEM_COLUMNS: &str = "network_id, timestamp, cpu_usage, memory_usage, temperature, \
                              disk_usage, active_users, bytes_in, bytes_out, uptime_secs";

fn system_row(row: &Row<'_>) -> rusqlite::Result<(SystemMetrics, i64)> {
    let ts: i64 = row.get(1)?;
    Ok((
        SystemMetrics {
            network_id: row.get(0)?,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            cpu_usage: row.get(2)?,
            memory_usage: row.get(3)?,
            temperature: row.get(4)?,
            disk_usage: row.get(5)?,
            active_users: row.get(6)?,
            bytes_in: row.get(7)?,
            bytes_out: row.get(8)?,
            uptime_secs: row.get(9)?,
        },
        ts,
    ))
}

/// Attach the converted timestamp to a `(record, unix_secs)` pair
fn stamp<T>(
    rows: impl Iterator<Item = rusqlite::Result<(T, i64)>>,
    mut set: impl FnMut(&mut T, DateTime<Utc>),
) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    for row in rows {
        let (mut record, ts) = row?;
        set(&mut record, from_unix(ts)?);
        out.push(record);
    }
    Ok(out)
}

#[derive(Clone)]
pub struct TelemetryStore {
    db: Database,
}

impl TelemetryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ===== Writes =====

    pub fn insert_system(&self, m: &SystemMetrics) -> Result<(), StoreError> {
        let conn = self.db.conn();
        conn.execute(
            &format!(
                "INSERT INTO system_metrics ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                SYSTEM_COLUMNS
            ),
            params![
                m.network_id,
                m.timestamp.timestamp(),
                m.cpu_usage,
                m.memory_usage,
                m.temperature,
                m.disk_usage,
                m.active_users,
                m.bytes_in,
                m.bytes_out,
                m.uptime_secs,
            ],
        )?;
        Ok(())
    }

    pub fn insert_speed_test(&self, t: &SpeedTest) -> Result<(), StoreError> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO speed_tests (network_id, timestamp, download_mbps, upload_mbps, latency_ms, jitter_ms, device)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                t.network_id,
                t.timestamp.timestamp(),
                t.download_mbps,
                t.upload_mbps,
                t.latency_ms,
                t.jitter_ms,
                t.device,
            ],
        )?;
        Ok(())
    }

    pub fn insert_data_usage(&self, u: &DataUsageSnapshot) -> Result<(), StoreError> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO data_usage (network_id, timestamp, period, bytes_in, bytes_out, unique_users)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                u.network_id,
                u.timestamp.timestamp(),
                u.period.as_str(),
                u.bytes_in,
                u.bytes_out,
                u.unique_users,
            ],
        )?;
        Ok(())
    }

    pub fn insert_session_analytics(&self, a: &SessionAnalytics) -> Result<(), StoreError> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO session_analytics
             (network_id, timestamp, period, total_sessions, active_sessions, new_sessions, revenue, avg_duration_mins)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                a.network_id,
                a.timestamp.timestamp(),
                a.period.as_str(),
                a.total_sessions,
                a.active_sessions,
                a.new_sessions,
                a.revenue,
                a.avg_duration_mins,
            ],
        )?;
        Ok(())
    }

    // ===== Reads =====

    pub fn system_metrics(
        &self,
        network_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SystemMetrics>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM system_metrics
             WHERE network_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC, id ASC",
            SYSTEM_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![network_id, start.timestamp(), end.timestamp()],
            system_row,
        )?;
        stamp(rows, |m, ts| m.timestamp = ts)
    }

    /// Most recent system sample regardless of window
    pub fn latest_system(&self, network_id: &str) -> Result<Option<SystemMetrics>, StoreError> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM system_metrics WHERE network_id = ?1
                     ORDER BY timestamp DESC, id DESC LIMIT 1",
                    SYSTEM_COLUMNS
                ),
                params![network_id],
                system_row,
            )
            .optional()?;

        match row {
            Some((mut m, ts)) => {
                m.timestamp = from_unix(ts)?;
                Ok(Some(m))
            }
            None => Ok(None),
        }
    }

    pub fn speed_tests(
        &self,
        network_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SpeedTest>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT network_id, timestamp, download_mbps, upload_mbps, latency_ms, jitter_ms, device
             FROM speed_tests
             WHERE network_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![network_id, start.timestamp(), end.timestamp()], |row| {
            Ok((
                SpeedTest {
                    network_id: row.get(0)?,
                    timestamp: DateTime::<Utc>::UNIX_EPOCH,
                    download_mbps: row.get(2)?,
                    upload_mbps: row.get(3)?,
                    latency_ms: row.get(4)?,
                    jitter_ms: row.get(5)?,
                    device: row.get(6)?,
                },
                row.get::<_, i64>(1)?,
            ))
        })?;
        stamp(rows, |t, ts| t.timestamp = ts)
    }

    pub fn data_usage(
        &self,
        network_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DataUsageSnapshot>, StoreError> {
        let raw = {
            let conn = self.db.conn();
            let mut stmt = conn.prepare(
                "SELECT network_id, timestamp, period, bytes_in, bytes_out, unique_users
                 FROM data_usage
                 WHERE network_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let rows = stmt.query_map(
                params![network_id, start.timestamp(), end.timestamp()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u64>(3)?,
                        row.get::<_, u64>(4)?,
                        row.get::<_, u32>(5)?,
                    ))
                },
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        raw.into_iter()
            .map(|(network_id, ts, period, bytes_in, bytes_out, unique_users)| {
                Ok(DataUsageSnapshot {
                    network_id,
                    timestamp: from_unix(ts)?,
                    period: parse_enum(&period)?,
                    bytes_in,
                    bytes_out,
                    unique_users,
                })
            })
            .collect()
    }

    pub fn session_analytics(
        &self,
        network_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SessionAnalytics>, StoreError> {
        let raw = {
            let conn = self.db.conn();
            let mut stmt = conn.prepare(
                "SELECT network_id, timestamp, period, total_sessions, active_sessions, new_sessions,
                        revenue, avg_duration_mins
                 FROM session_analytics
                 WHERE network_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let rows = stmt.query_map(
                params![network_id, start.timestamp(), end.timestamp()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, u32>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, f64>(7)?,
                    ))
                },
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        raw.into_iter()
            .map(|(network_id, ts, period, total, active, new, revenue, avg)| {
                Ok(SessionAnalytics {
                    network_id,
                    timestamp: from_unix(ts)?,
                    period: parse_enum(&period)?,
                    total_sessions: total,
                    active_sessions: active,
                    new_sessions: new,
                    revenue,
                    avg_duration_mins: avg,
                })
            })
            .collect()
    }
}
