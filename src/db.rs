//! Shared SQLite handle
//!
//! One `Database` is opened at startup and cloned into every store. All
//! access goes through a single mutex-guarded connection; statements are
//! short so contention stays low.

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id INTEGER PRIMARY KEY,
    network_id TEXT NOT NULL,
    guest TEXT NOT NULL,
    token TEXT NOT NULL,
    duration_hours INTEGER NOT NULL,
    amount TEXT NOT NULL DEFAULT '0',
    start_time INTEGER,
    active INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_network ON sessions(network_id);
CREATE INDEX IF NOT EXISTS idx_sessions_guest ON sessions(network_id, guest);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status, created_at);

CREATE TABLE IF NOT EXISTS session_ips (
    session_id INTEGER NOT NULL REFERENCES sessions(session_id),
    ip TEXT NOT NULL,
    first_seen INTEGER NOT NULL,
    PRIMARY KEY (session_id, ip)
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS networks (
    network_id TEXT PRIMARY KEY,
    id TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    config TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS system_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    network_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    cpu_usage REAL NOT NULL,
    memory_usage REAL NOT NULL,
    temperature REAL NOT NULL,
    disk_usage REAL NOT NULL,
    active_users INTEGER NOT NULL,
    bytes_in INTEGER NOT NULL,
    bytes_out INTEGER NOT NULL,
    uptime_secs INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_system_metrics_net_time ON system_metrics(network_id, timestamp);

CREATE TABLE IF NOT EXISTS speed_tests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    network_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    download_mbps REAL NOT NULL,
    upload_mbps REAL NOT NULL,
    latency_ms REAL NOT NULL,
    jitter_ms REAL,
    device TEXT
);

CREATE INDEX IF NOT EXISTS idx_speed_tests_net_time ON speed_tests(network_id, timestamp);

CREATE TABLE IF NOT EXISTS data_usage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    network_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    period TEXT NOT NULL,
    bytes_in INTEGER NOT NULL,
    bytes_out INTEGER NOT NULL,
    unique_users INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_data_usage_net_time ON data_usage(network_id, timestamp);

CREATE TABLE IF NOT EXISTS session_analytics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    network_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    period TEXT NOT NULL,
    total_sessions INTEGER NOT NULL,
    active_sessions INTEGER NOT NULL,
    new_sessions INTEGER NOT NULL,
    revenue REAL NOT NULL,
    avg_duration_mins REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_analytics_net_time ON session_analytics(network_id, timestamp);
"#;

/// Cloneable handle to the process-wide connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database file and apply the schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        let db = Self::from_connection(conn)?;

        info!("Database opened: {} (journal_mode={})", path.display(), mode);
        Ok(db)
    }

    /// In-memory database (tests, one-off tooling)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Lock the connection for a unit of work
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Cheap liveness probe used by readiness checks
    pub fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("zaanet.db");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        db.ping().unwrap();
    }

    #[test]
    fn test_schema_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("zaanet.db");
        drop(Database::open(&path).unwrap());
        let db = Database::open(&path).unwrap();
        db.ping().unwrap();
    }

    #[test]
    fn test_clones_share_connection() {
        let db = Database::open_in_memory().unwrap();
        let other = db.clone();
        db.conn()
            .execute(
                "INSERT INTO metadata (key, value, updated_at) VALUES ('k', 'v', 0)",
                [],
            )
            .unwrap();
        let value: String = other
            .conn()
            .query_row("SELECT value FROM metadata WHERE key = 'k'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(value, "v");
    }
}
