//! Conversation reactivation daemon.
//!
//! Sweeps silent conversations in SQLite on a fixed interval and sends
//! follow-ups through a webhook, or logs them when no webhook is configured.

mod config;
mod webhook;

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use database::Database;
use reactivation_core::MessageChannel;
use reactivation_engine::{LoggingChannel, ReactivationEngine, SqliteStore};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::webhook::WebhookChannel;

#[derive(Debug, Parser)]
#[command(name = "reactivation-daemon")]
#[command(about = "Follow up with contacts who stopped responding")]
struct Args {
    /// Run a single sweep and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,reactivation_engine=debug")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    let channel: Arc<dyn MessageChannel> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookChannel::new(url.as_str())?),
        None => {
            warn!("OUTBOUND_WEBHOOK_URL not set, follow-ups will only be logged");
            Arc::new(LoggingChannel)
        }
    };
    info!(channel = channel.name(), shard = %config.engine.shard, "Starting reactivation daemon");

    let min_idle = chrono::Duration::from_std(config.engine.min_idle)?;
    let store = Arc::new(SqliteStore::new(db.clone(), min_idle));
    let engine = ReactivationEngine::new(store, channel, &config.engine);

    if args.once {
        let report = engine.sweep(Utc::now()).await;
        info!(
            candidates = report.candidates,
            executed = report.executed,
            waiting = report.waiting,
            failed = report.failed,
            errors = report.errors,
            "Single sweep finished"
        );
        db.close().await;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, finishing current sweep");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {}", e);
                // Keep the sender alive so the scheduler keeps running.
                std::future::pending::<()>().await;
            }
        }
    });

    engine.run(shutdown_rx).await;
    db.close().await;

    Ok(())
}
