//! Named key/value metadata records

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::Database;
use crate::error::StoreError;

/// Key holding the last ledger block processed by the sync worker
pub const LAST_PROCESSED_BLOCK: &str = "last_processed_block";

#[derive(Clone)]
pub struct MetadataStore {
    db: Database,
}

impl MetadataStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.db.conn();
        let value = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO metadata (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Last processed block, if a sync has ever completed
    pub fn cursor(&self) -> Result<Option<u64>, StoreError> {
        match self.get(LAST_PROCESSED_BLOCK)? {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| StoreError::Corrupt(format!("invalid cursor value: {:?}", raw))),
            None => Ok(None),
        }
    }

    pub fn set_cursor(&self, block: u64) -> Result<(), StoreError> {
        self.set(LAST_PROCESSED_BLOCK, &block.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_absent_then_set() {
        let store = MetadataStore::new(Database::open_in_memory().unwrap());
        assert_eq!(store.cursor().unwrap(), None);

        store.set_cursor(120).unwrap();
        assert_eq!(store.cursor().unwrap(), Some(120));

        store.set_cursor(180).unwrap();
        assert_eq!(store.cursor().unwrap(), Some(180));
    }

    #[test]
    fn test_corrupt_cursor_is_an_error() {
        let store = MetadataStore::new(Database::open_in_memory().unwrap());
        store.set(LAST_PROCESSED_BLOCK, "not-a-number").unwrap();
        assert!(matches!(store.cursor(), Err(StoreError::Corrupt(_))));
    }
}
