//! GOJO scheduler -- daily summary email dispatch for the GOJO sales suite.
//!
//! A background worker fires the RFP, prospect and client-need summary
//! functions once per working day, records the run in a persistent ledger and
//! broadcasts the outcome to every connected bridge.

pub mod api;
pub mod backend;
pub mod bridge;
pub mod config;
pub mod ledger;
pub mod scheduler;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::backend::{HttpBackend, SummaryBackend};
use crate::bridge::{Bridge, LogNotifier, WorkerRegistry};
use crate::config::GojoConfig;
use crate::ledger::{Ledger, MemoryLedger, SqliteLedger};
use crate::scheduler::{Clock, ScheduledTask, SystemClock, WorkerSpec};

/// Open the configured ledger, or a throwaway in-memory one.
pub fn open_ledger(config: &GojoConfig, ephemeral: bool) -> Result<Arc<dyn Ledger>> {
    if ephemeral {
        warn!("using an in-memory ledger, execution history will not survive a restart");
        return Ok(Arc::new(MemoryLedger::new()));
    }
    let db_path = &config.storage.db_path;
    info!(db_path = %db_path.display(), "Initializing database");
    let pool = storage::open_pool(db_path)?;
    Ok(Arc::new(SqliteLedger::new(pool)))
}

/// Assemble the worker definition from configuration and collaborators.
pub fn worker_spec(
    config: &GojoConfig,
    ledger: Arc<dyn Ledger>,
    backend: Arc<dyn SummaryBackend>,
    clock: Arc<dyn Clock>,
) -> Result<WorkerSpec> {
    let task = ScheduledTask::from_config(&config.schedule).context("invalid [schedule] section")?;
    Ok(WorkerSpec {
        task,
        ledger,
        backend,
        clock,
        tick_interval: config.schedule.tick_interval(),
        pacing: config.schedule.pacing_delay(),
    })
}

/// Start the daemon: ledger, scheduler worker, result listener, HTTP API.
pub async fn serve(config: &GojoConfig, bind: &str, ephemeral: bool) -> Result<()> {
    // 1. Initialize Storage
    let ledger = open_ledger(config, ephemeral)?;

    // 2. Backend client
    if config.backend.api_key.is_empty() {
        warn!("backend.api_key is empty, summary functions will be called unauthenticated");
    }
    let backend: Arc<dyn SummaryBackend> = Arc::new(HttpBackend::new(&config.backend)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 3. Register the worker
    let spec = worker_spec(config, ledger.clone(), backend, clock.clone())?;
    let task = spec.task.clone();
    let registry = Arc::new(WorkerRegistry::new(spec));
    let notifier = Arc::new(LogNotifier::new(config.notifications.permission));
    let bridge = Bridge::new(registry, ledger, notifier)
        .with_reply_timeout(config.schedule.reply_timeout());

    if !bridge.initialize() {
        anyhow::bail!("scheduler worker could not be registered");
    }

    // 4. Log every execution result
    bridge.on_result_broadcast(|result| {
        info!(
            run_id = %result.run_id,
            trigger = ?result.trigger,
            total_emails = result.total_emails,
            "{}",
            result.summary()
        );
    });

    // 5. Start API Server
    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address: {bind}"))?;
    let app = api::router(api::state::AppState {
        bridge,
        task,
        clock,
    });

    info!(%addr, "GOJO scheduler listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
