//! ABOUTME: Worker entry point — connects the configured storage/pub-sub/LLM
//! ABOUTME: backends and polls `TEMPORAL_TASK_QUEUE` for agent-execution work

use anyhow::Result;
use std::sync::Arc;
use truss_config::TrussConfig;
use truss_worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();

    let config = TrussConfig::load()?;
    tracing::info!(
        database_url = %config.database_url,
        temporal_url = %config.temporal_url,
        task_queue = %config.temporal_task_queue,
        "starting truss worker"
    );

    let worker = Arc::new(Worker::from_config(&config).await?);
    tracing::info!(
        task_queue = worker.task_queue(),
        activities = ?truss_worker::ACTIVITY_NAMES,
        "worker ready; awaiting shutdown signal"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, exiting");
    Ok(())
}

/// Tracing initialised from `RUST_LOG`, defaulting to `info`, matching the
/// ambient logging stack used throughout the workspace.
fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
