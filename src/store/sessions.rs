//! Session Store
//!
//! Sessions are never deleted, only status-transitioned. Observed IPs live
//! in their own `(session_id, ip)` keyed table so concurrent appends
//! collapse instead of racing on a serialized list.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeSet;

use super::{from_unix, parse_enum};
use crate::db::Database;
use crate::error::StoreError;
use crate::models::{Session, SessionStatus};

const SESSION_COLUMNS: &str = "session_id, network_id, guest, token, duration_hours, amount, \
                               start_time, active, status, created_at";

/// Raw row before timestamp/enum conversion
struct SessionRow {
    session_id: u64,
    network_id: String,
    guest: String,
    token: String,
    duration_hours: i64,
    amount: String,
    start_time: Option<i64>,
    active: bool,
    status: String,
    created_at: i64,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            network_id: row.get(1)?,
            guest: row.get(2)?,
            token: row.get(3)?,
            duration_hours: row.get(4)?,
            amount: row.get(5)?,
            start_time: row.get(6)?,
            active: row.get(7)?,
            status: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_session(self, observed_ips: BTreeSet<String>) -> Result<Session, StoreError> {
        Ok(Session {
            session_id: self.session_id,
            network_id: self.network_id,
            guest: self.guest,
            token: self.token,
            duration_hours: self.duration_hours,
            amount: self.amount,
            start_time: self.start_time.map(from_unix).transpose()?,
            active: self.active,
            status: parse_enum(&self.status)?,
            observed_ips,
            created_at: from_unix(self.created_at)?,
        })
    }
}

/// Live session counts for one network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusCounts {
    pub pending: u64,
    pub active: u64,
    pub expired: u64,
}

impl SessionStatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.active + self.expired
    }
}

#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load a session with its observed IPs
    pub fn get(&self, session_id: u64) -> Result<Option<Session>, StoreError> {
        let conn = self.db.conn();

        let row = conn
            .query_row(
                &format!("SELECT {} FROM sessions WHERE session_id = ?1", SESSION_COLUMNS),
                params![session_id],
                SessionRow::from_row,
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT ip FROM session_ips WHERE session_id = ?1 ORDER BY ip")?;
        let ips = stmt
            .query_map(params![session_id], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;

        row.into_session(ips).map(Some)
    }

    pub fn exists(&self, session_id: u64) -> Result<bool, StoreError> {
        let conn = self.db.conn();
        let found = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE session_id = ?1",
                params![session_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert unless the session ID is already recorded.
    ///
    /// Returns `true` when a row was written.
    pub fn insert_if_absent(&self, session: &Session) -> Result<bool, StoreError> {
        let conn = self.db.conn();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO sessions
             (session_id, network_id, guest, token, duration_hours, amount, start_time, active, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                session.session_id,
                session.network_id,
                session.guest,
                session.token,
                session.duration_hours,
                session.amount,
                session.start_time.map(|t| t.timestamp()),
                session.active,
                session.status.as_str(),
                session.created_at.timestamp(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Start the clock on first use.
    ///
    /// Only applies while `start_time` is unset, so concurrent first uses
    /// converge on whichever write landed first.
    pub fn start(&self, session_id: u64, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.db.conn();
        let changed = conn.execute(
            "UPDATE sessions SET start_time = ?2, active = 1, status = 'active'
             WHERE session_id = ?1 AND start_time IS NULL AND status = 'pending'",
            params![session_id, now.timestamp()],
        )?;
        Ok(changed > 0)
    }

    /// Move a session to `expired`. No-op if already expired.
    pub fn expire(&self, session_id: u64) -> Result<bool, StoreError> {
        let conn = self.db.conn();
        let changed = conn.execute(
            "UPDATE sessions SET active = 0, status = 'expired'
             WHERE session_id = ?1 AND status != 'expired'",
            params![session_id],
        )?;
        Ok(changed > 0)
    }

    /// Record an observed client IP (set semantics)
    pub fn add_ip(&self, session_id: u64, ip: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.db.conn();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO session_ips (session_id, ip, first_seen) VALUES (?1, ?2, ?3)",
            params![session_id, ip, now.timestamp()],
        )?;
        Ok(changed > 0)
    }

    /// Sessions for a network, newest first
    pub fn list_by_network(&self, network_id: &str, limit: usize) -> Result<Vec<Session>, StoreError> {
        let ids: Vec<u64> = {
            let conn = self.db.conn();
            let mut stmt = conn.prepare(
                "SELECT session_id FROM sessions WHERE network_id = ?1
                 ORDER BY created_at DESC, session_id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![network_id, limit as i64], |r| r.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = self.get(id)? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    /// Current active session for a guest on a network, if any
    pub fn find_active(&self, network_id: &str, guest: &str) -> Result<Option<Session>, StoreError> {
        let id: Option<u64> = {
            let conn = self.db.conn();
            conn.query_row(
                "SELECT session_id FROM sessions
                 WHERE network_id = ?1 AND guest = ?2 AND status = 'active'
                 ORDER BY start_time DESC LIMIT 1",
                params![network_id, guest.to_lowercase()],
                |r| r.get(0),
            )
            .optional()?
        };

        match id {
            Some(id) => self.get(id),
            None => Ok(None),
        }
    }

    pub fn count_by_status(&self, network_id: &str) -> Result<SessionStatusCounts, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM sessions WHERE network_id = ?1 GROUP BY status",
        )?;
        let rows = stmt.query_map(params![network_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?;

        let mut counts = SessionStatusCounts::default();
        for row in rows {
            let (status, count) = row?;
            let count = count.max(0) as u64;
            match parse_enum::<SessionStatus>(&status)? {
                SessionStatus::Pending => counts.pending = count,
                SessionStatus::Active => counts.active = count,
                SessionStatus::Expired => counts.expired = count,
            }
        }
        Ok(counts)
    }

    /// Expire sessions that stayed `pending` since before `cutoff`
    pub fn reap_pending(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.db.conn();
        let changed = conn.execute(
            "UPDATE sessions SET active = 0, status = 'expired'
             WHERE status = 'pending' AND start_time IS NULL AND created_at < ?1",
            params![cutoff.timestamp()],
        )?;
        Ok(changed)
    }
}
