use crate::core::{build, TraceRecord};
use crate::hardware::{CanConfig, CanInterface};
use crate::input::{is_sorted, sort_by_timestamp};
use crate::playback::pacer::{self, Pacer};
use crate::playback::{ReplayOptions, Shutdown, WorkerState};
use crate::stats::{WorkerOutcome, WorkerStats};
use futures::FutureExt;
use std::any::Any;
use std::borrow::Cow;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Replays one trace on one bus handle and measures loopback latency
///
/// The worker owns its interface for the whole run and always disconnects it
/// before returning, whatever happened on the way.
pub struct ReplayWorker {
    tag: String,
    channel: String,
    options: ReplayOptions,
    state: WorkerState,
    /// Shared by all workers of a run so their timestamps are comparable
    epoch: Instant,
}

impl ReplayWorker {
    pub fn new(tag: &str, channel: &str, options: ReplayOptions, epoch: Instant) -> Self {
        Self {
            tag: tag.to_string(),
            channel: channel.to_string(),
            options,
            state: WorkerState::Idle,
            epoch,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Open the bus, replay `trace`, close the bus, and hand back the frozen stats
    pub async fn run(
        &mut self,
        mut interface: Box<dyn CanInterface>,
        trace: &[TraceRecord],
        mut shutdown: Shutdown,
    ) -> WorkerStats {
        if self.state != WorkerState::Idle {
            warn!("[{}] Worker already ran, ignoring", self.tag);
            return WorkerStats::with_outcome(WorkerOutcome::Aborted("worker reused".to_string()));
        }

        if let Err(e) = interface.connect(CanConfig::loopback(&self.channel)).await {
            error!("[{}] Error: {}", self.tag, e);
            // Release anything a half-finished open may hold
            let _ = interface.disconnect().await;
            self.state = WorkerState::Finished;
            return WorkerStats::with_outcome(WorkerOutcome::OpenFailed(e.to_string()));
        }

        self.state = WorkerState::Running;
        info!("[{}] Replaying {} records on {} ({})",
              self.tag, trace.len(), self.channel, interface.name());

        let trace = if is_sorted(trace) {
            Cow::Borrowed(trace)
        } else {
            warn!("[{}] Trace is not in timestamp order, sorting", self.tag);
            let mut sorted = trace.to_vec();
            sort_by_timestamp(&mut sorted);
            Cow::Owned(sorted)
        };

        let mut stats = WorkerStats::default();
        let replayed = AssertUnwindSafe(self.replay(interface.as_mut(), &trace, &mut shutdown, &mut stats))
            .catch_unwind()
            .await;
        if let Err(panic) = replayed {
            let reason = panic_message(panic.as_ref());
            error!("[{}] Error: replay panicked: {}", self.tag, reason);
            stats.outcome = WorkerOutcome::Aborted(reason);
        }

        if let Err(e) = interface.disconnect().await {
            warn!("[{}] Failed to close {}: {}", self.tag, self.channel, e);
        }
        self.state = WorkerState::Finished;

        info!("[{}] Finished ({:?}): TX {}, RX {}",
              self.tag, stats.outcome, stats.tx_count, stats.rx_count);
        stats
    }

    async fn replay(
        &self,
        interface: &mut dyn CanInterface,
        trace: &[TraceRecord],
        shutdown: &mut Shutdown,
        stats: &mut WorkerStats,
    ) {
        let mut cadence = Pacer::new(self.options.speed);
        let timeout = self.options.receive_timeout;

        for (index, record) in trace.iter().enumerate() {
            let delay = cadence.next_delay(record.timestamp);
            if !pacer::wait(delay, shutdown).await {
                info!("[{}] Stopped after {} of {} records", self.tag, index, trace.len());
                stats.outcome = WorkerOutcome::Cancelled;
                break;
            }

            let frame = match build(record, self.options.policy) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("[{}] Error: record {}: {}", self.tag, index, e);
                    stats.build_errors += 1;
                    continue;
                }
            };

            let t0 = Instant::now();
            if let Err(e) = interface.send(&frame).await {
                error!("[{}] Error: send {}: {}", self.tag, frame, e);
                stats.send_errors += 1;
                continue;
            }
            stats.tx_count += 1;
            stats.first_tx_ns.get_or_insert(self.nanos_since_epoch(t0));

            let received = match tokio::time::timeout(timeout, interface.receive(timeout)).await {
                Ok(Ok(received)) => received,
                Ok(Err(e)) => {
                    warn!("[{}] Error: receive: {}", self.tag, e);
                    None
                }
                Err(_) => None,
            };
            let t1 = Instant::now();
            stats.last_tx_ns = Some(self.nanos_since_epoch(t1));

            if received.is_some() {
                let latency = t1.duration_since(t0).as_nanos() as u64;
                debug!("[{}] Sent and received {}. Latency: {:.1} us",
                       self.tag, frame, latency as f64 / 1000.0);
                stats.latencies.push(latency);
                stats.rx_count += 1;
            } else {
                debug!("[{}] Timed out waiting for loopback of {}", self.tag, frame);
                stats.missed += 1;
            }
        }
    }

    fn nanos_since_epoch(&self, instant: Instant) -> u64 {
        instant.saturating_duration_since(self.epoch).as_nanos() as u64
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
