//! Runs several replay workers side by side and merges their results.
//!
//! Workers share nothing while running. Each one returns its stats through
//! its join handle, and nothing is merged until every handle has resolved.

use crate::core::TraceRecord;
use crate::hardware::InterfaceFactory;
use crate::playback::{ReplayOptions, ReplayWorker, Shutdown};
use crate::stats::{AggregateReport, WorkerOutcome, WorkerStats};
use chrono::Utc;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{error, info};

/// One worker's share of the run
#[derive(Debug, Clone)]
pub struct Assignment {
    pub tag: String,
    pub channel: String,
    pub trace: Vec<TraceRecord>,
}

impl Assignment {
    pub fn new(tag: &str, channel: &str, trace: Vec<TraceRecord>) -> Self {
        Self {
            tag: tag.to_string(),
            channel: channel.to_string(),
            trace,
        }
    }
}

/// Replay every assignment concurrently and merge the results
///
/// Assignments may name the same channel; such workers transmit and receive
/// on it concurrently and may see each other's frames.
pub async fn run_workers(
    assignments: Vec<Assignment>,
    factory: &dyn InterfaceFactory,
    options: ReplayOptions,
    shutdown: Shutdown,
) -> AggregateReport {
    let started_at = Utc::now();
    let epoch = Instant::now();

    let mut per_channel: HashMap<&str, usize> = HashMap::new();
    for assignment in &assignments {
        *per_channel.entry(assignment.channel.as_str()).or_default() += 1;
    }
    for (channel, count) in per_channel.iter().filter(|(_, count)| **count > 1) {
        info!("Combined-channel mode: {} workers share {}", count, channel);
    }

    let handles: Vec<_> = assignments
        .into_iter()
        .map(|Assignment { tag, channel, trace }| {
            let interface = factory.create(&tag, &channel);
            let mut worker = ReplayWorker::new(&tag, &channel, options.clone(), epoch);
            let shutdown = shutdown.clone();
            let handle = tokio::spawn(async move { worker.run(interface, &trace, shutdown).await });
            (tag, handle)
        })
        .collect();

    info!("Started {} replay workers", handles.len());

    let mut results = Vec::with_capacity(handles.len());
    for (tag, handle) in handles {
        let stats = match handle.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("[{}] Worker task failed: {}", tag, e);
                WorkerStats::with_outcome(WorkerOutcome::Aborted(e.to_string()))
            }
        };
        results.push((tag, stats));
    }

    AggregateReport::merge(started_at, epoch.elapsed(), results)
}
