//! ZaaNet Backend - Entry Point
//!
//! Modes:
//! - Default: HTTP API plus background event sync
//! - --sync-once / -s: run a single sync pass and exit

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use zaanet_backend::{
    AppState, Config, Database, EventSyncWorker, JsonRpcLedger, MetadataStore, Server,
    SessionStore, SessionTokenSigner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let sync_once_mode = args.iter().any(|a| a == "--sync-once" || a == "-s");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("ZaaNet Backend v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: zaanet-backend [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --sync-once, -s    Run one ledger sync pass and exit");
        println!("  --help, -h         Show this help");
        println!();
        println!("Default: Serve the HTTP API and sync the ledger in the background");
        println!();
        println!("Environment variables:");
        println!("  ZAANET_DB_PATH               SQLite database path");
        println!("  ZAANET_TOKEN_SECRET          Session token signing secret");
        println!("  ZAANET_RPC_URL               Ledger JSON-RPC endpoint");
        println!("  ZAANET_CONTRACT_ADDRESS      Contract emitting SessionStarted");
        println!("  ZAANET_SYNC_INTERVAL_SECS    Background sync interval (default: 60, 0 = off)");
        println!("  ZAANET_PENDING_TTL_HOURS     Expire unused sessions after (default: 168)");
        println!("  ZAANET_IPFS_GATEWAY          Gateway for network images");
        println!("  ZAANET_BIND_ADDR / ZAANET_PORT   Listen address (default: 127.0.0.1:8080)");
        println!("  ZAANET_LOG_JSON=1            Log as JSON");
        return Ok(());
    }

    // Setup logging
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let json_logs = std::env::var("ZAANET_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("ZaaNet Backend v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let db = Database::open(&config.db_path)?;
    info!("Database at {}", config.db_path.display());

    let signer = SessionTokenSigner::new(&config.token_secret);
    let ledger = Arc::new(JsonRpcLedger::new(
        config.ledger.clone(),
        config.sync.max_block_range,
    )?);
    let worker = Arc::new(EventSyncWorker::new(
        ledger,
        SessionStore::new(db.clone()),
        MetadataStore::new(db.clone()),
        signer.clone(),
        config.sync.clone(),
    ));

    if sync_once_mode {
        let report = worker.sync_once(Utc::now()).await?;
        info!(
            "Sync complete: head {}, {} events, {} new sessions, {} reaped",
            report.head_block, report.events_seen, report.sessions_created, report.pending_reaped
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sync_handle = match config.sync.interval {
        Some(interval) => Some(tokio::spawn(worker.clone().run(interval, shutdown_rx))),
        None => {
            warn!("Background sync disabled; use POST /api/sync or --sync-once");
            None
        }
    };

    let state = Arc::new(AppState::new(db, signer, worker, &config.ipfs_gateway));
    let server = Server::new(config.socket_addr(), config.cors_origins.clone(), state);
    server.run(shutdown_tx).await?;

    if let Some(handle) = sync_handle {
        if let Err(e) = handle.await {
            warn!("Sync worker task ended abnormally: {}", e);
        }
    }

    Ok(())
}
