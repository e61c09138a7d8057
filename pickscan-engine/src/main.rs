//! Pickscan - terminal driver for the scan ingestion engine
//!
//! Reads operator input from stdin, one entry per line, and prints every
//! session event as a JSON line on stdout:
//!
//! - `<code>`: one finalized scanner burst
//! - `voice: <transcript>`: a final voice transcript
//! - `:commit`, `:retry`, `:override`, `:dismiss`
//! - `:cases <n>`, `:units <n>`: edit the active slot
//! - `:modal on|off`
//! - `:changed [code ...]`: inventory change notification

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pickscan_common::config::ScanProfile;
use pickscan_common::time::{Clock, SystemClock};
use pickscan_common::{EngineConfig, ScanEvent};
use pickscan_engine::inventory::{Catalog, InMemoryInventory};
use pickscan_engine::{FlushOutcome, PickSession};

/// Command-line arguments for pickscan
#[derive(Parser, Debug)]
#[command(name = "pickscan")]
#[command(about = "Scan ingestion and commit engine for warehouse picking")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Product catalog (TOML) for the in-memory inventory
    #[arg(long, env = "PICKSCAN_CATALOG")]
    catalog: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Use the handheld scanner profile (500ms idle window)
    #[arg(long)]
    handheld: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = EngineConfig::resolve(args.config.as_deref())
        .context("Failed to load configuration")?;
    let mut config = loaded.config;
    if args.handheld {
        config.scan.profile = ScanProfile::Handheld;
    }

    // Initialize tracing
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pickscan={level},pickscan_engine={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Configuration loaded from {:?}", loaded.source);
    info!(
        "Scan profile {:?}, idle window {:?}, quiet period {:?}",
        config.scan.profile,
        config.scan.idle_window(),
        config.accumulation.quiet_period()
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let inventory = match &args.catalog {
        Some(path) => {
            let catalog = Catalog::load(path)
                .with_context(|| format!("Failed to load catalog {}", path.display()))?;
            info!("Loaded {} catalog items from {}", catalog.products.len(), path.display());
            Arc::new(InMemoryInventory::from_catalog(catalog, clock.clone()))
        }
        None => {
            warn!("No catalog given, every code will be reported as not found");
            Arc::new(InMemoryInventory::new(clock.clone()))
        }
    };

    let session =
        PickSession::new(config, inventory, clock).context("Failed to initialize pick session")?;
    let printer = tokio::spawn(print_events(session.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => handle_line(&session, line.trim()).await,
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    let mut outcome = session.commit_now().await;
    if let FlushOutcome::Suppressed { code } = &outcome {
        info!("Final flush of {} deferred by the resubmit guard, waiting", code);
        tokio::time::sleep(session.config().accumulation.resubmit_guard()).await;
        outcome = session.commit_now().await;
    }
    info!("Final flush: {:?}", outcome);

    drop(session);
    printer.await.context("Event printer failed")?;
    info!("Shutdown complete");
    Ok(())
}

async fn handle_line(session: &PickSession, line: &str) {
    if line.is_empty() {
        return;
    }

    if let Some(transcript) = line.strip_prefix("voice:") {
        let outcome = session.handle_transcript(transcript.trim()).await;
        info!("Voice: {:?}", outcome);
        return;
    }

    let Some(command) = line.strip_prefix(':') else {
        let outcome = session.process_scan(ScanEvent::keyboard(line)).await;
        info!("Scan: {:?}", outcome);
        return;
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();
    match (name, arg) {
        ("commit", _) => info!("Commit: {:?}", session.commit_now().await),
        ("retry", _) => match session.retry_failed_commit().await {
            Ok(outcome) => info!("Retry: {:?}", outcome),
            Err(e) => warn!("Retry refused: {}", e),
        },
        ("override", _) => match session.override_duplicate().await {
            Ok(outcome) => info!("Override: {:?}", outcome),
            Err(e) => warn!("Override refused: {}", e),
        },
        ("dismiss", _) => {
            if !session.dismiss_duplicate() {
                warn!("Nothing to dismiss");
            }
        }
        ("cases", Some(n)) => match n.parse() {
            Ok(n) => match session.set_case_count(n).await {
                Ok(count) => info!("Case count set to {}", count),
                Err(e) => warn!("Case count refused: {}", e),
            },
            Err(_) => warn!("Invalid case count '{}'", n),
        },
        ("units", Some(n)) => match n.parse() {
            Ok(n) => match session.set_units_per_case(n).await {
                Ok(units) => info!("Units per case set to {}", units),
                Err(e) => warn!("Units per case refused: {}", e),
            },
            Err(_) => warn!("Invalid units per case '{}'", n),
        },
        ("modal", Some("on")) => session.set_modal_open(true).await,
        ("modal", Some("off")) => session.set_modal_open(false).await,
        ("changed", _) => {
            let codes: Vec<String> = command
                .split_whitespace()
                .skip(1)
                .map(str::to_string)
                .collect();
            session.apply_inventory_change(&codes).await;
        }
        _ => warn!("Unknown command ':{}'", command),
    }
}

/// Print session events as JSON lines until the session is dropped
async fn print_events(mut rx: tokio::sync::broadcast::Receiver<pickscan_common::events::PickEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Failed to serialize {}: {}", event.event_type(), e),
            },
            Err(RecvError::Lagged(n)) => warn!("Event printer lagged, {} events skipped", n),
            Err(RecvError::Closed) => break,
        }
    }
}
