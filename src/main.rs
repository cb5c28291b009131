//! # Relaycast
//!
//! Telegram bot that checks submitted resumes and reposts approved ones to a
//! channel on a fixed interval.
//!
//! Usage:
//!   relaycast                        # Run the bot (same as `relaycast run`)
//!   relaycast --config bot.toml run  # Custom config file
//!   relaycast migrate                # Apply database migrations and exit
//!   relaycast stats                  # Record counts and queue depth
//!   relaycast status alice           # Show what /status would reply for @alice

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use relaycast_channels::TelegramChannel;
use relaycast_core::config::{RelayConfig, expand_path};
use relaycast_core::traits::{IntakeQueue, RecordStore};
use relaycast_pipeline::commands::render_status;
use relaycast_pipeline::{AppContext, MessageHandler, spawn_workers};
use relaycast_store::{SqliteQueue, SqliteRecordStore};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "relaycast",
    version,
    about = "📣 Relaycast: checked submissions, rebroadcast on schedule"
)]
struct Cli {
    /// Config file (default: ~/.relaycast/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot
    Run,
    /// Create or upgrade the databases, then exit
    Migrate,
    /// Print record counts per status and the queue depth
    Stats,
    /// Print the /status reply for an identity
    Status {
        /// Telegram username (without @) or numeric user id
        identity: String,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<RelayConfig> {
    let config = match path {
        Some(p) => {
            let mut config = RelayConfig::load_from(p)?;
            config.apply_env();
            config
        }
        None => RelayConfig::load()?,
    };
    Ok(config)
}

fn open_store(config: &RelayConfig) -> Result<SqliteRecordStore> {
    let path = expand_path(&config.storage.database_path);
    Ok(SqliteRecordStore::open(&path, config.storage.busy_timeout())?)
}

fn open_queue(config: &RelayConfig) -> Result<SqliteQueue> {
    let path = expand_path(&config.storage.queue_path);
    Ok(SqliteQueue::open(
        &path,
        config.storage.busy_timeout(),
        config.queue.visibility_timeout(),
        config.queue.poll_interval(),
    )?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "relaycast=debug,relaycast_pipeline=debug,relaycast_scheduler=debug,relaycast_providers=debug,relaycast_channels=debug,relaycast_store=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Migrate => {
            open_store(&config)?;
            open_queue(&config)?;
            println!("✅ Databases are up to date");
            println!("   Records: {}", expand_path(&config.storage.database_path).display());
            println!("   Queue:   {}", expand_path(&config.storage.queue_path).display());
            Ok(())
        }
        Commands::Stats => {
            let counts = open_store(&config)?.count_by_status().await?;
            let depth = open_queue(&config)?.depth().await?;
            println!("📊 Relaycast");
            println!("   Pending:  {}", counts.pending);
            println!("   Approved: {}", counts.approved);
            println!("   Rejected: {}", counts.rejected);
            println!("   Queued:   {depth}");
            Ok(())
        }
        Commands::Status { identity } => {
            let identity = identity.trim_start_matches('@');
            let record = open_store(&config)?.get(identity).await?;
            println!("{}", render_status(record.as_ref(), config.schedule.interval()));
            Ok(())
        }
    }
}

async fn run(config: RelayConfig) -> Result<()> {
    config.validate()?;

    let store = Arc::new(open_store(&config)?);
    let queue = Arc::new(open_queue(&config)?);
    let provider = Arc::new(relaycast_providers::create_provider(&config)?);
    let telegram = Arc::new(TelegramChannel::new(config.telegram.clone())?);

    match telegram.get_me().await {
        Ok(me) => tracing::info!(
            "🤖 Connected as @{}",
            me.username.unwrap_or(me.first_name)
        ),
        Err(e) => tracing::warn!("⚠️ Telegram getMe failed, continuing: {e}"),
    }

    let workers = config.queue.workers;
    let ctx = AppContext::new(
        config,
        store,
        queue,
        provider,
        telegram.clone(),
        telegram.clone(),
    );
    let handler = MessageHandler::new(ctx.clone());

    ctx.scheduler.restore().await?;
    handler.intake().requeue_pending().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handles = spawn_workers(&ctx, workers, shutdown_rx);

    let mut updates = telegram.start_polling();
    tracing::info!("🚀 Relaycast running ({workers} worker(s))");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Shutting down");
                break;
            }
            incoming = updates.next() => {
                let Some(msg) = incoming else {
                    tracing::warn!("Telegram stream ended");
                    break;
                };
                let reply = match handler.handle(&msg).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::error!("Failed to handle message from @{}: {e}", msg.identity);
                        Some("⚠️ Something went wrong, please try again later.".to_string())
                    }
                };
                if let Some(reply) = reply
                    && let Err(e) = telegram.send_message(&msg.thread_id, &reply).await
                {
                    tracing::warn!("⚠️ Reply to {} failed: {e}", msg.thread_id);
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for handle in worker_handles {
        let _ = handle.await;
    }
    ctx.scheduler.shutdown();
    Ok(())
}
