//! Ledger Client
//!
//! Read-only access to the payment contract's `SessionStarted` events.
//!
//! # Event layout
//!
//! ```text
//! SessionStarted(uint256 indexed sessionId,
//!                uint256 indexed networkId,
//!                address indexed guest,
//!                uint256 duration,      // hours
//!                uint256 amount)        // token base units
//!
//! topics = [topic0, sessionId, networkId, guest]
//! data   = duration ‖ amount            (2 × 32-byte words)
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::models::{MAX_DURATION_HOURS, MAX_SESSION_ID};

/// Decoded `SessionStarted` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartedEvent {
    pub session_id: u64,
    pub network_id: String,
    /// Lowercase 0x-prefixed address
    pub guest: String,
    pub duration_hours: i64,
    pub amount: String,
    pub block_number: u64,
    pub tx_hash: String,
}

impl SessionStartedEvent {
    /// Reject values the session store cannot hold
    pub fn check_bounds(&self) -> Result<(), LedgerError> {
        if self.session_id > MAX_SESSION_ID {
            return Err(LedgerError::Decode(format!(
                "sessionId {} exceeds {}",
                self.session_id, MAX_SESSION_ID
            )));
        }
        if !(0..=MAX_DURATION_HOURS).contains(&self.duration_hours) {
            return Err(LedgerError::Decode(format!(
                "duration {}h outside 0..={}",
                self.duration_hours, MAX_DURATION_HOURS
            )));
        }
        Ok(())
    }
}

/// Read side of the chain the sync worker depends on
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Current chain head
    async fn head_block(&self) -> Result<u64, LedgerError>;

    /// `SessionStarted` events in `[from, to]`, in chain order
    async fn session_started_events(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<SessionStartedEvent>, LedgerError>;
}

// ============================================================================
// JSON-RPC implementation
// ============================================================================

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    transaction_hash: Option<String>,
    #[serde(default)]
    removed: bool,
}

/// Ethereum JSON-RPC ledger (`eth_blockNumber`, `eth_getLogs`)
pub struct JsonRpcLedger {
    client: reqwest::Client,
    config: LedgerConfig,
    max_block_range: u64,
}

impl JsonRpcLedger {
    pub fn new(config: LedgerConfig, max_block_range: u64) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            max_block_range: max_block_range.max(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: RpcResponse<T> = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        response
            .result
            .ok_or_else(|| LedgerError::Decode(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl Ledger for JsonRpcLedger {
    async fn head_block(&self) -> Result<u64, LedgerError> {
        let raw: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw)
    }

    async fn session_started_events(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<SessionStartedEvent>, LedgerError> {
        let mut events = Vec::new();
        let mut chunk_start = from;

        while chunk_start <= to {
            let chunk_end = chunk_start
                .saturating_add(self.max_block_range - 1)
                .min(to);

            let mut filter = json!({
                "fromBlock": format!("0x{:x}", chunk_start),
                "toBlock": format!("0x{:x}", chunk_end),
                "topics": [self.config.session_event_topic],
            });
            if let Some(address) = &self.config.contract_address {
                filter["address"] = json!(address);
            }

            let logs: Vec<RpcLog> = self.call("eth_getLogs", json!([filter])).await?;
            debug!(
                "eth_getLogs {}..={} returned {} logs",
                chunk_start,
                chunk_end,
                logs.len()
            );

            // A malformed log decodes the same way on every retry
            for log in logs.iter().filter(|l| !l.removed) {
                match decode_session_started(log) {
                    Ok(event) => events.push(event),
                    Err(e) => warn!(
                        tx_hash = log.transaction_hash.as_deref().unwrap_or("unknown"),
                        "Skipping SessionStarted log: {}",
                        e
                    ),
                }
            }

            if chunk_end == u64::MAX {
                break;
            }
            chunk_start = chunk_end + 1;
        }

        Ok(events)
    }
}

// ============================================================================
// ABI decoding
// ============================================================================

/// Parse a JSON-RPC hex quantity (`0x1a`)
pub fn parse_quantity(raw: &str) -> Result<u64, LedgerError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::Decode(format!("quantity without 0x prefix: {}", raw)))?;
    if digits.is_empty() {
        return Err(LedgerError::Decode("empty quantity".into()));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::Decode(format!("bad quantity {}: {}", raw, e)))
}

fn decode_hex(raw: &str) -> Result<Vec<u8>, LedgerError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|e| LedgerError::Decode(format!("bad hex: {}", e)))
}

fn word(bytes: &[u8]) -> Result<[u8; 32], LedgerError> {
    bytes
        .try_into()
        .map_err(|_| LedgerError::Decode(format!("expected 32-byte word, got {}", bytes.len())))
}

/// uint256 word → u128; rejects values that do not fit
fn word_to_u128(word: &[u8; 32]) -> Result<u128, LedgerError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(LedgerError::Decode("uint256 value exceeds 128 bits".into()));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

fn word_to_address(word: &[u8; 32]) -> Result<String, LedgerError> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(LedgerError::Decode("address word has dirty high bytes".into()));
    }
    Ok(format!("0x{}", hex::encode(&word[12..])))
}

fn decode_session_started(log: &RpcLog) -> Result<SessionStartedEvent, LedgerError> {
    if log.topics.len() != 4 {
        return Err(LedgerError::Decode(format!(
            "expected 4 topics, got {}",
            log.topics.len()
        )));
    }

    let session_word = word(&decode_hex(&log.topics[1])?)?;
    let network_word = word(&decode_hex(&log.topics[2])?)?;
    let guest_word = word(&decode_hex(&log.topics[3])?)?;

    let data = decode_hex(&log.data)?;
    if data.len() < 64 {
        return Err(LedgerError::Decode(format!(
            "expected 64 data bytes, got {}",
            data.len()
        )));
    }
    let duration_word = word(&data[0..32])?;
    let amount_word = word(&data[32..64])?;

    let session_id = u64::try_from(word_to_u128(&session_word)?)
        .map_err(|_| LedgerError::Decode("sessionId exceeds 64 bits".into()))?;
    let duration_hours = i64::try_from(word_to_u128(&duration_word)?)
        .map_err(|_| LedgerError::Decode("duration out of range".into()))?;

    let block_number = match &log.block_number {
        Some(raw) => parse_quantity(raw)?,
        None => 0,
    };

    let event = SessionStartedEvent {
        session_id,
        network_id: word_to_u128(&network_word)?.to_string(),
        guest: word_to_address(&guest_word)?,
        duration_hours,
        amount: word_to_u128(&amount_word)?.to_string(),
        block_number,
        tx_hash: log.transaction_hash.clone().unwrap_or_default(),
    };
    event.check_bounds()?;
    Ok(event)
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// Scriptable ledger for tests and local development
#[derive(Default)]
pub struct InMemoryLedger {
    head: AtomicU64,
    events: Mutex<Vec<SessionStartedEvent>>,
    failing: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and move the head to its block if needed
    pub fn push_event(&self, event: SessionStartedEvent) {
        self.head.fetch_max(event.block_number, Ordering::SeqCst);
        self.events.lock().push(event);
    }

    pub fn set_head(&self, block: u64) {
        self.head.store(block, Ordering::SeqCst);
    }

    /// Make every subsequent call fail (simulated outage)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Rpc {
                code: -32000,
                message: "ledger unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn head_block(&self) -> Result<u64, LedgerError> {
        self.check()?;
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn session_started_events(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<SessionStartedEvent>, LedgerError> {
        self.check()?;
        let mut events: Vec<_> = self
            .events
            .lock()
            .iter()
            .filter(|e| e.block_number >= from && e.block_number <= to)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.block_number);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_hex(value: u128) -> String {
        format!("0x{:064x}", value)
    }

    fn sample_log() -> RpcLog {
        RpcLog {
            topics: vec![
                crate::config::SESSION_STARTED_TOPIC.to_string(),
                word_hex(17),
                word_hex(3),
                "0x000000000000000000000000abcdefabcdefabcdefabcdefabcdefabcdefabcd".to_string(),
            ],
            data: format!("0x{:064x}{:064x}", 2u128, 5_000_000u128),
            block_number: Some("0x10".into()),
            transaction_hash: Some("0xfeed".into()),
            removed: false,
        }
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert!(parse_quantity("1a").is_err());
        assert!(parse_quantity("0x").is_err());
    }

    #[test]
    fn test_decode_session_started() {
        let event = decode_session_started(&sample_log()).unwrap();
        assert_eq!(event.session_id, 17);
        assert_eq!(event.network_id, "3");
        assert_eq!(event.guest, "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd");
        assert_eq!(event.duration_hours, 2);
        assert_eq!(event.amount, "5000000");
        assert_eq!(event.block_number, 16);
        assert_eq!(event.tx_hash, "0xfeed");
    }

    #[test]
    fn test_decode_rejects_short_data() {
        let mut log = sample_log();
        log.data = format!("0x{:064x}", 2u128);
        assert!(matches!(decode_session_started(&log), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_missing_topics() {
        let mut log = sample_log();
        log.topics.truncate(2);
        assert!(decode_session_started(&log).is_err());
    }

    #[test]
    fn test_decode_rejects_oversized_session_id() {
        let mut log = sample_log();
        log.topics[1] = word_hex(u128::from(u64::MAX) + 1);
        assert!(decode_session_started(&log).is_err());
    }

    #[test]
    fn test_decode_rejects_ids_and_durations_beyond_storage() {
        let mut log = sample_log();
        log.topics[1] = word_hex(u128::from(u64::MAX));
        assert!(matches!(decode_session_started(&log), Err(LedgerError::Decode(_))));

        let mut log = sample_log();
        log.data = format!("0x{:064x}{:064x}", 10_000_000_000u128, 1u128);
        assert!(matches!(decode_session_started(&log), Err(LedgerError::Decode(_))));

        let mut log = sample_log();
        log.topics[1] = word_hex(u128::from(MAX_SESSION_ID));
        log.data = format!("0x{:064x}{:064x}", MAX_DURATION_HOURS as u128, 1u128);
        assert!(decode_session_started(&log).is_ok());
    }

    #[tokio::test]
    async fn test_in_memory_ledger_filters_range() {
        let ledger = InMemoryLedger::new();
        for block in [5, 10, 15] {
            ledger.push_event(SessionStartedEvent {
                session_id: block,
                network_id: "1".into(),
                guest: "0xaa".into(),
                duration_hours: 1,
                amount: "1".into(),
                block_number: block,
                tx_hash: String::new(),
            });
        }

        assert_eq!(ledger.head_block().await.unwrap(), 15);
        let events = ledger.session_started_events(6, 15).await.unwrap();
        assert_eq!(events.len(), 2);

        ledger.set_failing(true);
        assert!(ledger.head_block().await.is_err());
    }
}
