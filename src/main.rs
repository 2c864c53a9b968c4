use anyhow::{Context, Result};
use can_replay::config::ReplayConfig;
use can_replay::playback::{run_workers, shutdown_channel};
use can_replay::report::format_report;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_arg = std::env::args().nth(1).map(PathBuf::from);
    let config = ReplayConfig::resolve(config_arg.as_deref()).context("Failed to load configuration")?;
    let assignments = config.load_assignments()?;

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping workers");
            trigger.trigger();
        }
    });

    info!("Replaying {} traces over {:?}", assignments.len(), config.backend);
    let backend = config.backend();
    let report = run_workers(assignments, &backend, config.options(), shutdown).await;

    println!("\n{}", format_report(&report));
    Ok(())
}
