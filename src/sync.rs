//! Event Sync Worker
//!
//! Follows the ledger's `SessionStarted` events and records each new one as
//! a pending session with a freshly signed token.
//!
//! Delivery is at-least-once: the cursor is only written after every event
//! in the scanned range has been stored, and inserts are keyed by session ID
//! so a retried range never creates duplicates.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::ledger::Ledger;
use crate::models::Session;
use crate::store::{MetadataStore, SessionStore};
use crate::token::{SessionClaims, SessionTokenSigner};

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// First block scanned (None when already caught up)
    pub from_block: Option<u64>,
    /// Chain head at the time of the pass
    pub head_block: u64,
    pub events_seen: usize,
    pub sessions_created: usize,
    pub duplicates_skipped: usize,
    /// Events with IDs or durations the store cannot hold
    pub malformed_skipped: usize,
    pub pending_reaped: usize,
}

/// Counters across runs
#[derive(Debug, Default)]
pub struct SyncStats {
    pub runs: AtomicU64,
    pub failures: AtomicU64,
    pub sessions_created: AtomicU64,
}

pub struct EventSyncWorker {
    ledger: Arc<dyn Ledger>,
    sessions: SessionStore,
    metadata: MetadataStore,
    signer: SessionTokenSigner,
    config: SyncConfig,
    stats: Arc<SyncStats>,
    /// Serializes runs within this process
    run_lock: Mutex<()>,
}

impl EventSyncWorker {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        sessions: SessionStore,
        metadata: MetadataStore,
        signer: SessionTokenSigner,
        config: SyncConfig,
    ) -> Self {
        Self {
            ledger,
            sessions,
            metadata,
            signer,
            config,
            stats: Arc::new(SyncStats::default()),
            run_lock: Mutex::new(()),
        }
    }

    pub fn stats(&self) -> Arc<SyncStats> {
        self.stats.clone()
    }

    /// Run one sync pass.
    ///
    /// Any ledger or store failure aborts the pass before the cursor moves.
    pub async fn sync_once(&self, now: DateTime<Utc>) -> Result<SyncReport, ApiError> {
        let _guard = self.run_lock.lock().await;
        self.stats.runs.fetch_add(1, Ordering::Relaxed);

        match self.run_pass(now).await {
            Ok(report) => {
                self.stats
                    .sessions_created
                    .fetch_add(report.sessions_created as u64, Ordering::Relaxed);
                Ok(report)
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn run_pass(&self, now: DateTime<Utc>) -> Result<SyncReport, ApiError> {
        let cursor = self.metadata.cursor()?;
        let head = self.ledger.head_block().await?;

        let from = match cursor {
            Some(last) => last.saturating_add(1),
            None => head.saturating_sub(self.config.lookback_blocks),
        };

        let mut report = SyncReport {
            head_block: head,
            ..Default::default()
        };

        if from > head {
            debug!("Sync caught up at block {}", head);
            report.pending_reaped = self.reap_pending(now)?;
            return Ok(report);
        }

        report.from_block = Some(from);
        let events = self.ledger.session_started_events(from, head).await?;
        report.events_seen = events.len();

        for event in events {
            if let Err(e) = event.check_bounds() {
                warn!(block = event.block_number, tx_hash = %event.tx_hash, "Skipping event: {}", e);
                report.malformed_skipped += 1;
                continue;
            }
            if self.sessions.exists(event.session_id)? {
                report.duplicates_skipped += 1;
                continue;
            }

            let guest = event.guest.to_lowercase();
            let token = self.signer.sign(&SessionClaims {
                session_id: event.session_id,
                network_id: event.network_id.clone(),
                guest: guest.clone(),
                iat: now.timestamp(),
            })?;

            let session = Session::pending(
                event.session_id,
                event.network_id,
                guest,
                token,
                event.duration_hours,
                event.amount,
                now,
            );

            if self.sessions.insert_if_absent(&session)? {
                report.sessions_created += 1;
                info!(
                    session_id = session.session_id,
                    network_id = %session.network_id,
                    block = event.block_number,
                    "Recorded pending session"
                );
            } else {
                report.duplicates_skipped += 1;
            }
        }

        self.metadata.set_cursor(head)?;
        report.pending_reaped = self.reap_pending(now)?;

        info!(
            "Sync {}..={}: {} events, {} new sessions, {} duplicates",
            from, head, report.events_seen, report.sessions_created, report.duplicates_skipped
        );
        Ok(report)
    }

    fn reap_pending(&self, now: DateTime<Utc>) -> Result<usize, ApiError> {
        let cutoff = now
            .checked_sub_signed(self.config.pending_ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let reaped = self.sessions.reap_pending(cutoff)?;
        if reaped > 0 {
            info!("Reaped {} abandoned pending sessions", reaped);
        }
        Ok(reaped)
    }

    /// Drive `sync_once` on a fixed interval until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("Event sync worker started (interval {:?})", interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_once(Utc::now()).await {
                        warn!("Event sync failed, will retry next tick: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Event sync worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::ledger::{InMemoryLedger, SessionStartedEvent};
    use crate::models::SessionStatus;

    struct Harness {
        ledger: Arc<InMemoryLedger>,
        sessions: SessionStore,
        metadata: MetadataStore,
        worker: EventSyncWorker,
        signer: SessionTokenSigner,
    }

    fn harness() -> Harness {
        let db = Database::open_in_memory().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let sessions = SessionStore::new(db.clone());
        let metadata = MetadataStore::new(db);
        let signer = SessionTokenSigner::new("test-secret-at-least-32-characters-long");
        let worker = EventSyncWorker::new(
            ledger.clone(),
            sessions.clone(),
            metadata.clone(),
            signer.clone(),
            SyncConfig {
                lookback_blocks: 100,
                ..Default::default()
            },
        );
        Harness {
            ledger,
            sessions,
            metadata,
            worker,
            signer,
        }
    }

    fn event(session_id: u64, block: u64) -> SessionStartedEvent {
        SessionStartedEvent {
            session_id,
            network_id: "9".into(),
            guest: "0xABCDEFabcdefABCDEFabcdefABCDEFabcdefABCD".into(),
            duration_hours: 1,
            amount: "1000000".into(),
            block_number: block,
            tx_hash: format!("0x{:x}", block),
        }
    }

    #[tokio::test]
    async fn test_new_event_creates_pending_session_with_token() {
        let h = harness();
        h.ledger.push_event(event(1, 50));

        let report = h.worker.sync_once(Utc::now()).await.unwrap();
        assert_eq!(report.sessions_created, 1);
        assert_eq!(report.from_block, Some(0));
        assert_eq!(h.metadata.cursor().unwrap(), Some(50));

        let session = h.sessions.get(1).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
        assert!(!session.active);
        assert!(session.start_time.is_none());
        assert_eq!(session.guest, "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd");

        let claims = h.signer.verify(&session.token).unwrap();
        assert_eq!(claims.session_id, 1);
        assert_eq!(claims.network_id, "9");
        assert_eq!(claims.guest, session.guest);
    }

    #[tokio::test]
    async fn test_replay_creates_no_duplicates() {
        let h = harness();
        h.ledger.push_event(event(1, 50));
        h.worker.sync_once(Utc::now()).await.unwrap();
        let token_before = h.sessions.get(1).unwrap().unwrap().token;

        // Rewind the cursor so the same range is scanned again
        h.metadata.set_cursor(10).unwrap();
        let report = h.worker.sync_once(Utc::now()).await.unwrap();

        assert_eq!(report.events_seen, 1);
        assert_eq!(report.sessions_created, 0);
        assert_eq!(report.duplicates_skipped, 1);
        assert_eq!(h.sessions.get(1).unwrap().unwrap().token, token_before);
        assert_eq!(h.sessions.list_by_network("9", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_resumes_after_last_block() {
        let h = harness();
        h.ledger.push_event(event(1, 50));
        h.worker.sync_once(Utc::now()).await.unwrap();

        h.ledger.push_event(event(2, 60));
        let report = h.worker.sync_once(Utc::now()).await.unwrap();
        assert_eq!(report.from_block, Some(51));
        assert_eq!(report.events_seen, 1);
        assert_eq!(report.sessions_created, 1);
        assert_eq!(h.metadata.cursor().unwrap(), Some(60));
    }

    #[tokio::test]
    async fn test_lookback_without_cursor() {
        let h = harness();
        h.ledger.push_event(event(1, 20));
        h.ledger.push_event(event(2, 450));
        h.ledger.set_head(500);

        let report = h.worker.sync_once(Utc::now()).await.unwrap();
        assert_eq!(report.from_block, Some(400));
        assert_eq!(report.sessions_created, 1);
        assert!(h.sessions.get(1).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_does_not_advance_cursor() {
        let h = harness();
        h.metadata.set_cursor(10).unwrap();
        h.ledger.push_event(event(1, 50));
        h.ledger.set_failing(true);

        assert!(h.worker.sync_once(Utc::now()).await.is_err());
        assert_eq!(h.metadata.cursor().unwrap(), Some(10));
        assert_eq!(h.worker.stats().failures.load(Ordering::Relaxed), 1);

        h.ledger.set_failing(false);
        let report = h.worker.sync_once(Utc::now()).await.unwrap();
        assert_eq!(report.sessions_created, 1);
        assert_eq!(h.metadata.cursor().unwrap(), Some(50));
    }

    #[tokio::test]
    async fn test_out_of_range_event_is_skipped_not_blocking() {
        let h = harness();
        h.ledger.push_event(event(u64::MAX, 10));
        h.ledger.push_event(SessionStartedEvent {
            duration_hours: 10_000_000_000,
            ..event(3, 11)
        });
        h.ledger.push_event(event(2, 12));

        let report = h.worker.sync_once(Utc::now()).await.unwrap();
        assert_eq!(report.events_seen, 3);
        assert_eq!(report.malformed_skipped, 2);
        assert_eq!(report.sessions_created, 1);
        assert!(h.sessions.get(2).unwrap().is_some());
        assert!(h.sessions.get(3).unwrap().is_none());
        assert_eq!(h.metadata.cursor().unwrap(), Some(12));
    }

    #[tokio::test]
    async fn test_caught_up_is_a_noop() {
        let h = harness();
        h.ledger.set_head(30);
        h.metadata.set_cursor(30).unwrap();

        let report = h.worker.sync_once(Utc::now()).await.unwrap();
        assert_eq!(report.from_block, None);
        assert_eq!(report.events_seen, 0);
        assert_eq!(h.metadata.cursor().unwrap(), Some(30));
    }

    #[tokio::test]
    async fn test_abandoned_pending_sessions_are_reaped() {
        let h = harness();
        let long_ago = Utc::now() - chrono::Duration::days(30);
        h.ledger.push_event(event(1, 50));
        h.worker.sync_once(long_ago).await.unwrap();

        let report = h.worker.sync_once(Utc::now()).await.unwrap();
        assert_eq!(report.pending_reaped, 1);
        assert_eq!(h.sessions.get(1).unwrap().unwrap().status, SessionStatus::Expired);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness();
        let worker = Arc::new(h.worker);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(worker.clone().run(Duration::from_millis(10), rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
        assert!(worker.stats().runs.load(Ordering::Relaxed) >= 1);
    }
}
