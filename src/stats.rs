//! Replay statistics
//!
//! Each worker fills its own [`WorkerStats`] and hands it over by value when
//! it finishes; [`AggregateReport`] is built once from those frozen results.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// How a worker's run ended
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkerOutcome {
    /// Every record of the trace was processed
    #[default]
    Completed,
    /// Shutdown was requested before the trace was exhausted
    Cancelled,
    /// The bus could not be opened; nothing was sent
    OpenFailed(String),
    /// The worker task died; stats are empty
    Aborted(String),
}

impl WorkerOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, WorkerOutcome::Completed)
    }
}

/// Per-worker counters and latency samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStats {
    pub tx_count: u64,
    pub rx_count: u64,
    /// Send to loopback-receive latency in nanoseconds, in send order
    pub latencies: Vec<u64>,
    /// Nanoseconds since the run epoch of the first successful transmission
    pub first_tx_ns: Option<u64>,
    /// Nanoseconds since the run epoch after the last receive returned
    pub last_tx_ns: Option<u64>,
    pub build_errors: u64,
    pub send_errors: u64,
    /// Receives that timed out or failed
    pub missed: u64,
    pub outcome: WorkerOutcome,
}

impl WorkerStats {
    /// Empty stats carrying only an outcome
    pub fn with_outcome(outcome: WorkerOutcome) -> Self {
        Self {
            outcome,
            ..Self::default()
        }
    }

    pub fn latency_summary(&self) -> Option<LatencySummary> {
        LatencySummary::from_samples(&self.latencies)
    }

    /// Transmitted frames per second over the active window
    pub fn throughput(&self) -> Option<f64> {
        match (self.first_tx_ns, self.last_tx_ns) {
            (Some(first), Some(last)) if last > first => {
                Some(self.tx_count as f64 / ((last - first) as f64 / 1e9))
            }
            _ => None,
        }
    }
}

/// Summary of a set of latency samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub mean_ns: f64,
    pub median_ns: f64,
    pub min_ns: u64,
    pub max_ns: u64,
}

impl LatencySummary {
    /// Returns `None` for an empty sample set
    pub fn from_samples(samples: &[u64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let count = sorted.len();
        let mid = count / 2;
        let median_ns = if count % 2 == 0 {
            (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
        } else {
            sorted[mid] as f64
        };
        let sum: f64 = sorted.iter().map(|&s| s as f64).sum();

        Some(Self {
            count,
            mean_ns: sum / count as f64,
            median_ns,
            min_ns: sorted[0],
            max_ns: sorted[count - 1],
        })
    }
}

/// Merged result of a multi-worker run
#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub per_worker: BTreeMap<String, WorkerStats>,
    pub total_tx: u64,
    pub total_rx: u64,
    /// All workers' samples; each worker's block keeps its send order
    pub merged_latencies: Vec<u64>,
}

impl AggregateReport {
    /// Merge finished workers' stats, in the order given
    pub fn merge(
        started_at: DateTime<Utc>,
        elapsed: Duration,
        results: Vec<(String, WorkerStats)>,
    ) -> Self {
        let mut report = Self {
            started_at,
            elapsed,
            per_worker: BTreeMap::new(),
            total_tx: 0,
            total_rx: 0,
            merged_latencies: Vec::new(),
        };

        for (tag, stats) in results {
            report.total_tx += stats.tx_count;
            report.total_rx += stats.rx_count;
            report.merged_latencies.extend_from_slice(&stats.latencies);

            let mut key = tag.clone();
            let mut n = 2;
            while report.per_worker.contains_key(&key) {
                key = format!("{}#{}", tag, n);
                n += 1;
            }
            if key != tag {
                warn!("Duplicate worker tag {:?}, reporting as {:?}", tag, key);
            }
            report.per_worker.insert(key, stats);
        }

        report
    }

    pub fn latency_summary(&self) -> Option<LatencySummary> {
        LatencySummary::from_samples(&self.merged_latencies)
    }

    /// Workers that did not run their trace to the end
    pub fn incomplete_workers(&self) -> impl Iterator<Item = (&String, &WorkerOutcome)> {
        self.per_worker
            .iter()
            .filter(|(_, stats)| !stats.outcome.is_completed())
            .map(|(tag, stats)| (tag, &stats.outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(tx: u64, latencies: Vec<u64>) -> WorkerStats {
        WorkerStats {
            tx_count: tx,
            rx_count: latencies.len() as u64,
            latencies,
            ..WorkerStats::default()
        }
    }

    #[test]
    fn test_summary_odd_and_even() {
        let odd = LatencySummary::from_samples(&[30, 10, 20]).unwrap();
        assert_eq!(odd.count, 3);
        assert_eq!(odd.median_ns, 20.0);
        assert_eq!(odd.mean_ns, 20.0);
        assert_eq!((odd.min_ns, odd.max_ns), (10, 30));

        let even = LatencySummary::from_samples(&[40, 10, 20, 30]).unwrap();
        assert_eq!(even.median_ns, 25.0);
        assert_eq!(even.mean_ns, 25.0);

        assert!(LatencySummary::from_samples(&[]).is_none());
    }

    #[test]
    fn test_throughput() {
        let mut s = stats(10, vec![]);
        assert_eq!(s.throughput(), None);

        s.first_tx_ns = Some(1_000_000_000);
        s.last_tx_ns = Some(1_000_000_000);
        assert_eq!(s.throughput(), None);

        s.last_tx_ns = Some(3_000_000_000);
        assert_eq!(s.throughput(), Some(5.0));
    }

    #[test]
    fn test_merge() {
        let report = AggregateReport::merge(
            Utc::now(),
            Duration::from_secs(1),
            vec![
                ("b".to_string(), stats(3, vec![5, 6])),
                ("a".to_string(), stats(2, vec![1, 2])),
                ("c".to_string(), WorkerStats::with_outcome(WorkerOutcome::OpenFailed("no bus".into()))),
            ],
        );

        assert_eq!(report.total_tx, 5);
        assert_eq!(report.total_rx, 4);
        assert_eq!(report.merged_latencies, vec![5, 6, 1, 2]);
        assert_eq!(report.per_worker.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(report.incomplete_workers().count(), 1);
        assert_eq!(report.latency_summary().unwrap().mean_ns, 3.5);
    }

    #[test]
    fn test_merge_duplicate_tags() {
        let report = AggregateReport::merge(
            Utc::now(),
            Duration::ZERO,
            vec![("w".to_string(), stats(1, vec![1])), ("w".to_string(), stats(1, vec![2]))],
        );
        assert!(report.per_worker.contains_key("w"));
        assert!(report.per_worker.contains_key("w#2"));
        assert_eq!(report.total_tx, 2);
    }
}
