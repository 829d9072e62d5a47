//! Network Registry
//!
//! Registration requests arrive as loosely typed JSON. Every field is
//! optional at the serde layer so that a missing value is reported as a
//! `validation_error` naming the field instead of a generic parse failure.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::models::{Contact, Hardware, Location, NetworkConfig, NetworkStatus};
use crate::store::NetworkStore;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap()
});

static WALLET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap()
});

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInput {
    pub country: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    pub owner_email: Option<String>,
    pub owner_phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareInput {
    pub device_type: Option<String>,
    pub router_model: Option<String>,
}

/// Body of `POST /api/networks`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRegistration {
    /// On-chain network ID; hosts send it as either a string or a number
    pub network_id: Option<Value>,
    pub ssid: Option<String>,
    #[serde(default)]
    pub location: LocationInput,
    #[serde(default)]
    pub contact: ContactInput,
    #[serde(default)]
    pub hardware: HardwareInput,
    pub price: Option<f64>,
    pub image_cid: Option<String>,
    pub host_wallet: Option<String>,
}

/// Trimmed, non-empty string or a validation error for `field`
fn required(value: Option<&str>, field: &str) -> ApiResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ApiError::validation(field, format!("{} is required", field))),
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl NetworkRegistration {
    /// Check the request and build a config. Fails on the first violation.
    pub fn into_config(self, now: DateTime<Utc>) -> ApiResult<NetworkConfig> {
        let network_id = match &self.network_id {
            Some(Value::String(s)) => required(Some(s), "networkId")?,
            Some(Value::Number(n)) if n.is_u64() => n.to_string(),
            Some(Value::Number(_)) => {
                return Err(ApiError::validation(
                    "networkId",
                    "networkId must be a non-negative integer",
                ))
            }
            _ => return Err(ApiError::validation("networkId", "networkId is required")),
        };

        let ssid = required(self.ssid.as_deref(), "ssid")?;
        let country = required(self.location.country.as_deref(), "location.country")?;
        let city = required(self.location.city.as_deref(), "location.city")?;

        let owner_email = required(self.contact.owner_email.as_deref(), "contact.ownerEmail")?;
        if !EMAIL.is_match(&owner_email) {
            return Err(ApiError::validation(
                "contact.ownerEmail",
                "contact.ownerEmail must be a valid email address",
            ));
        }

        let device_type = required(self.hardware.device_type.as_deref(), "hardware.deviceType")?;

        let price = match self.price {
            Some(p) if p.is_finite() && p > 0.0 => p,
            Some(_) => return Err(ApiError::validation("price", "price must be greater than 0")),
            None => return Err(ApiError::validation("price", "price is required")),
        };

        let host_wallet = required(self.host_wallet.as_deref(), "hostWallet")?;
        if !WALLET.is_match(&host_wallet) {
            return Err(ApiError::validation(
                "hostWallet",
                "hostWallet must be a 0x-prefixed 20-byte hex address",
            ));
        }

        Ok(NetworkConfig {
            id: uuid::Uuid::new_v4().to_string(),
            network_id,
            ssid,
            location: Location {
                country,
                city,
                area: optional(self.location.area),
                latitude: self.location.latitude,
                longitude: self.location.longitude,
            },
            contact: Contact {
                owner_email,
                owner_phone: optional(self.contact.owner_phone),
            },
            hardware: Hardware {
                device_type,
                router_model: optional(self.hardware.router_model),
            },
            price_per_hour: price,
            image_cid: optional(self.image_cid),
            image_url: None,
            status: NetworkStatus::Active,
            host_wallet: host_wallet.to_lowercase(),
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Clone)]
pub struct NetworkRegistry {
    store: NetworkStore,
    ipfs_gateway: String,
}

impl NetworkRegistry {
    pub fn new(store: NetworkStore, ipfs_gateway: impl Into<String>) -> Self {
        Self {
            store,
            ipfs_gateway: ipfs_gateway.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn register(&self, request: NetworkRegistration, now: DateTime<Utc>) -> ApiResult<NetworkConfig> {
        let network = request.into_config(now)?;

        if !self.store.insert(&network)? {
            return Err(ApiError::validation(
                "networkId",
                format!("network {} is already registered", network.network_id),
            ));
        }

        info!(network_id = %network.network_id, ssid = %network.ssid, "Registered network");
        Ok(self.with_image_url(network))
    }

    pub fn get(&self, network_id: &str) -> ApiResult<NetworkConfig> {
        self.store
            .get(network_id)?
            .map(|n| self.with_image_url(n))
            .ok_or_else(|| ApiError::NotFound(format!("network {}", network_id)))
    }

    /// Fail with `not_found` unless the network is registered
    pub fn ensure_exists(&self, network_id: &str) -> ApiResult<()> {
        if self.store.exists(network_id)? {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("network {}", network_id)))
        }
    }

    pub fn list(&self) -> ApiResult<Vec<NetworkConfig>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(|n| self.with_image_url(n))
            .collect())
    }

    pub fn update_status(
        &self,
        network_id: &str,
        status: NetworkStatus,
        now: DateTime<Utc>,
    ) -> ApiResult<NetworkConfig> {
        let network = self
            .store
            .update_status(network_id, status, now)?
            .ok_or_else(|| ApiError::NotFound(format!("network {}", network_id)))?;

        info!(network_id, status = status.as_str(), "Network status changed");
        Ok(self.with_image_url(network))
    }

    fn with_image_url(&self, mut network: NetworkConfig) -> NetworkConfig {
        network.image_url = network
            .image_cid
            .as_deref()
            .map(|cid| format!("{}/ipfs/{}", self.ipfs_gateway, cid));
        network
    }
}
