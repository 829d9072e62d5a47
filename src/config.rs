//! Configuration management

use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::MAX_DURATION_HOURS;

/// keccak256("SessionStarted(uint256,uint256,address,uint256,uint256)")
pub const SESSION_STARTED_TOPIC: &str =
    "0x6da50d99a8b97e8de0739e7b62e344ddb4534ff301598aea8f59c2877485067e";

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path
    pub db_path: PathBuf,

    /// HMAC secret for session tokens
    pub token_secret: String,

    /// Ledger settings
    pub ledger: LedgerConfig,

    /// Sync worker settings
    pub sync: SyncConfig,

    /// Public IPFS gateway used to rewrite network image CIDs
    pub ipfs_gateway: String,

    /// HTTP bind address
    pub bind_addr: IpAddr,

    /// HTTP port
    pub port: u16,

    /// Allowed CORS origins (empty = any)
    pub cors_origins: Vec<String>,
}

/// JSON-RPC ledger configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Contract emitting `SessionStarted`
    pub contract_address: Option<String>,
    /// Topic0 of the `SessionStarted` event
    pub session_event_topic: String,
}

/// Event sync worker configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Blocks scanned back from head when no cursor exists
    pub lookback_blocks: u64,
    /// Max blocks per `eth_getLogs` call
    pub max_block_range: u64,
    /// Interval between background runs (None = disabled)
    pub interval: Option<Duration>,
    /// Pending sessions older than this are reaped to `expired`
    pub pending_ttl: chrono::Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lookback_blocks: 5000,
            max_block_range: 2000,
            interval: Some(Duration::from_secs(60)),
            pending_ttl: chrono::Duration::hours(168), // 7 days
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let db_path = std::env::var("ZAANET_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("zaanet")
                    .join("zaanet.db")
            });

        let token_secret = std::env::var("ZAANET_TOKEN_SECRET").unwrap_or_else(|_| {
            tracing::warn!("No token secret configured - using random secret (development only)");
            random_secret()
        });

        let rpc_url = std::env::var("ZAANET_RPC_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8545".to_string());

        let contract_address = std::env::var("ZAANET_CONTRACT_ADDRESS")
            .ok()
            .map(|a| a.to_lowercase());

        let session_event_topic = std::env::var("ZAANET_SESSION_EVENT_TOPIC")
            .map(|t| t.to_lowercase())
            .unwrap_or_else(|_| SESSION_STARTED_TOPIC.to_string());

        let defaults = SyncConfig::default();

        let lookback_blocks = env_parse("ZAANET_SYNC_LOOKBACK_BLOCKS")?
            .unwrap_or(defaults.lookback_blocks);

        let max_block_range = env_parse::<u64>("ZAANET_SYNC_MAX_RANGE")?
            .unwrap_or(defaults.max_block_range)
            .max(1);

        let interval = match env_parse::<u64>("ZAANET_SYNC_INTERVAL_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.interval,
        };

        let pending_ttl = match env_parse::<i64>("ZAANET_PENDING_TTL_HOURS")? {
            Some(hours) => pending_ttl_hours(hours)
                .with_context(|| "invalid value for ZAANET_PENDING_TTL_HOURS")?,
            None => defaults.pending_ttl,
        };

        let ipfs_gateway = std::env::var("ZAANET_IPFS_GATEWAY")
            .map(|g| g.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| "https://ipfs.io".to_string());

        let bind_addr = env_parse("ZAANET_BIND_ADDR")?
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let port = env_parse("ZAANET_PORT")?.unwrap_or(8080);

        let cors_origins = std::env::var("ZAANET_CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            db_path,
            token_secret,
            ledger: LedgerConfig {
                rpc_url,
                contract_address,
                session_event_topic,
            },
            sync: SyncConfig {
                lookback_blocks,
                max_block_range,
                interval,
                pending_ttl,
            },
            ipfs_gateway,
            bind_addr,
            port,
            cors_origins,
        })
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(None),
    }
}

fn random_secret() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..64)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

fn pending_ttl_hours(hours: i64) -> Result<chrono::Duration> {
    if !(1..=MAX_DURATION_HOURS).contains(&hours) {
        anyhow::bail!("expected 1..={} hours, got {}", MAX_DURATION_HOURS, hours);
    }
    chrono::Duration::try_hours(hours).context("duration overflow")
}
