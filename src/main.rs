//! Brain orchestrator binary: wires a `BrainContext` together and runs the
//! background tasks (leader lease renewal, queue drain, reconciliation
//! sweep, capital-flow sweep). The HTTP/webhook surface that feeds signals
//! in lives outside this crate; this binary only runs the core loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brain::collaborators::{NullExecution, TracingNotifier};
use brain::config::BrainConfig;
use brain::orchestrator::BrainContext;

#[derive(Parser)]
#[command(name = "brain", about = "Capital allocation and risk-gating orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Brain: leader election, signal processing, reconciliation sweeps.
    Serve,
    /// Rebuild in-memory/snapshot state from the event log.
    Rebuild {
        /// Wipe the event log and start from an empty state instead of replaying it.
        #[arg(long)]
        reset: bool,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = BrainConfig::from_env().context("loading BrainConfig from environment")?;
    init_tracing(&config.log_level);

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Rebuild { reset } => rebuild(config, reset).await,
    }
}

async fn serve(config: BrainConfig) -> Result<()> {
    info!("brain starting up");

    let instance_id = std::env::var("INSTANCE_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());
    let execution = Arc::new(NullExecution);
    let notifier = Arc::new(TracingNotifier);

    let (ctx, mut events_rx) = BrainContext::new(config, execution, notifier, instance_id)
        .await
        .context("constructing BrainContext")?;
    let ctx = Arc::new(ctx);

    ctx.recover().await.context("running startup recovery")?;

    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            info!(?event, "brain event");
        }
    });

    let lease_ctx = ctx.clone();
    let lease_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            match lease_ctx.leader.try_acquire().await {
                Ok(true) => {
                    info!("promoted to leader, running recovery before resuming signal processing");
                    if let Err(e) = lease_ctx.recover().await {
                        error!(error = %e, "recovery on promotion failed");
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "leader lease renewal failed"),
            }
        }
    });

    let reconciliation_ctx = ctx.clone();
    let reconciliation_interval_ms = reconciliation_ctx.config.reconciliation.interval_ms;
    let reconciliation_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(reconciliation_interval_ms));
        loop {
            ticker.tick().await;
            if !reconciliation_ctx.leader.is_leader() || !reconciliation_ctx.is_recovered() {
                continue;
            }
            match reconciliation_ctx.reconciliation.run_once().await {
                Ok(report) if !report.drifts.is_empty() => {
                    warn!(drift_count = report.drifts.len(), auto_resolved = report.auto_resolved, "reconciliation drift found");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "reconciliation sweep failed"),
            }
        }
    });

    let drain_ctx = ctx.clone();
    let drain_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(50));
        loop {
            ticker.tick().await;
            if !drain_ctx.leader.is_leader() || !drain_ctx.is_recovered() {
                continue;
            }
            drain_ctx.processor.drain_queue().await;
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown requested");
    ctx.leader.release().await;
    lease_task.abort();
    reconciliation_task.abort();
    drain_task.abort();

    Ok(())
}

async fn rebuild(config: BrainConfig, reset: bool) -> Result<()> {
    use brain::collaborators::EventStore;
    use brain::store::SqliteEventStore;

    let event_store = SqliteEventStore::open(&config.database_path).context("opening event store")?;

    if reset {
        warn!("resetting event log: all history will be discarded");
        event_store.truncate_all().await.context("truncating event log")?;
        info!("event log reset complete");
        return Ok(());
    }

    let events = event_store
        .replay("reconciliation", None)
        .await
        .context("replaying reconciliation aggregate")?;
    info!(count = events.len(), "replayed reconciliation events (read-only verification pass)");

    Ok(())
}
