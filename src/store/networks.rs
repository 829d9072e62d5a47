//! Registered network configurations
//!
//! The full config is stored as JSON; `network_id` and `status` are lifted
//! into columns for lookups and status updates.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::Database;
use crate::error::StoreError;
use crate::models::{NetworkConfig, NetworkStatus};

#[derive(Clone)]
pub struct NetworkStore {
    db: Database,
}

impl NetworkStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new network. Returns `false` if the network ID is taken.
    pub fn insert(&self, network: &NetworkConfig) -> Result<bool, StoreError> {
        let json = serde_json::to_string(network)?;
        let conn = self.db.conn();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO networks (network_id, id, status, config, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                network.network_id,
                network.id,
                network.status.as_str(),
                json,
                network.created_at.timestamp(),
                network.updated_at.timestamp(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn get(&self, network_id: &str) -> Result<Option<NetworkConfig>, StoreError> {
        let conn = self.db.conn();
        let json: Option<String> = conn
            .query_row(
                "SELECT config FROM networks WHERE network_id = ?1",
                params![network_id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from))
            .transpose()
    }

    pub fn exists(&self, network_id: &str) -> Result<bool, StoreError> {
        let conn = self.db.conn();
        let found = conn
            .query_row(
                "SELECT 1 FROM networks WHERE network_id = ?1",
                params![network_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// All networks, oldest registration first
    pub fn list(&self) -> Result<Vec<NetworkConfig>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare("SELECT config FROM networks ORDER BY created_at, network_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut networks = Vec::new();
        for json in rows {
            networks.push(serde_json::from_str(&json?)?);
        }
        Ok(networks)
    }

    /// Change lifecycle status. Returns the updated record, or `None` if unknown.
    pub fn update_status(
        &self,
        network_id: &str,
        status: NetworkStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<NetworkConfig>, StoreError> {
        let Some(mut network) = self.get(network_id)? else {
            return Ok(None);
        };

        network.status = status;
        network.updated_at = now;
        let json = serde_json::to_string(&network)?;

        let conn = self.db.conn();
        conn.execute(
            "UPDATE networks SET status = ?2, config = ?3, updated_at = ?4 WHERE network_id = ?1",
            params![network_id, status.as_str(), json, now.timestamp()],
        )?;
        Ok(Some(network))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, Hardware, Location};

    fn network(network_id: &str) -> NetworkConfig {
        let now = Utc::now();
        NetworkConfig {
            id: uuid::Uuid::new_v4().to_string(),
            network_id: network_id.to_string(),
            ssid: "ZaaNet-Cafe".into(),
            location: Location {
                country: "Ghana".into(),
                city: "Accra".into(),
                area: None,
                latitude: None,
                longitude: None,
            },
            contact: Contact {
                owner_email: "host@example.com".into(),
                owner_phone: None,
            },
            hardware: Hardware {
                device_type: "raspberry-pi".into(),
                router_model: None,
            },
            price_per_hour: 0.5,
            image_cid: None,
            image_url: None,
            status: NetworkStatus::Active,
            host_wallet: "0x00000000000000000000000000000000000000aa".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_get_and_duplicate() {
        let store = NetworkStore::new(Database::open_in_memory().unwrap());
        assert!(store.insert(&network("1")).unwrap());
        assert!(!store.insert(&network("1")).unwrap());
        assert!(store.exists("1").unwrap());
        assert_eq!(store.get("1").unwrap().unwrap().ssid, "ZaaNet-Cafe");
        assert!(store.get("2").unwrap().is_none());
    }

    #[test]
    fn test_update_status() {
        let store = NetworkStore::new(Database::open_in_memory().unwrap());
        store.insert(&network("1")).unwrap();

        let updated = store
            .update_status("1", NetworkStatus::Maintenance, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, NetworkStatus::Maintenance);
        assert_eq!(store.get("1").unwrap().unwrap().status, NetworkStatus::Maintenance);
        assert!(store.update_status("9", NetworkStatus::Offline, Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_list_orders_by_registration() {
        let store = NetworkStore::new(Database::open_in_memory().unwrap());
        store.insert(&network("b")).unwrap();
        store.insert(&network("a")).unwrap();
        let ids: Vec<_> = store.list().unwrap().into_iter().map(|n| n.network_id).collect();
        assert_eq!(ids.len(), 2);
    }
}
