//! Human-readable run summaries

use crate::stats::{AggregateReport, WorkerOutcome, WorkerStats};
use std::fmt::Write;

/// Summary block for one worker
pub fn format_worker(tag: &str, stats: &WorkerStats) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "[{}] TX: {}, RX: {}", tag, stats.tx_count, stats.rx_count);
    if let Some(latency) = stats.latency_summary() {
        let _ = writeln!(out, "{} Latency mean: {:.0} ns, median: {:.0} ns (min {} ns, max {} ns)",
                         tag, latency.mean_ns, latency.median_ns, latency.min_ns, latency.max_ns);
    }
    if let Some(throughput) = stats.throughput() {
        let _ = writeln!(out, "{} TX throughput: {:.2} msg/sec", tag, throughput);
    }
    if stats.build_errors + stats.send_errors + stats.missed > 0 {
        let _ = writeln!(out, "{} Dropped: {} malformed, {} send failures, {} missed receptions",
                         tag, stats.build_errors, stats.send_errors, stats.missed);
    }
    match &stats.outcome {
        WorkerOutcome::Completed => {}
        WorkerOutcome::Cancelled => {
            let _ = writeln!(out, "{} Stopped early, partial results", tag);
        }
        WorkerOutcome::OpenFailed(reason) => {
            let _ = writeln!(out, "{} Bus open failed: {}", tag, reason);
        }
        WorkerOutcome::Aborted(reason) => {
            let _ = writeln!(out, "{} Aborted: {}", tag, reason);
        }
    }

    out
}

/// Full summary: every worker in tag order, then the overall figures
pub fn format_report(report: &AggregateReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "======== Summary ========");
    let _ = writeln!(out, "Run started {} ({:.3} s)",
                     report.started_at.format("%Y-%m-%d %H:%M:%S%.3f UTC"),
                     report.elapsed.as_secs_f64());

    for (tag, stats) in &report.per_worker {
        let _ = writeln!(out);
        out.push_str(&format_worker(tag, stats));
    }

    let _ = writeln!(out);
    if let Some(latency) = report.latency_summary() {
        let _ = writeln!(out, "[Overall] Latency mean: {:.0} ns, median: {:.0} ns",
                         latency.mean_ns, latency.median_ns);
    }
    let _ = writeln!(out, "[Overall] Total TX: {}, RX: {}", report.total_tx, report.total_rx);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn finished(tx: u64, latencies: Vec<u64>) -> WorkerStats {
        WorkerStats {
            tx_count: tx,
            rx_count: latencies.len() as u64,
            latencies,
            first_tx_ns: Some(0),
            last_tx_ns: Some(2_000_000_000),
            ..WorkerStats::default()
        }
    }

    #[test]
    fn test_format_worker() {
        let text = format_worker("proc_fd_1", &finished(4, vec![100, 300]));
        assert!(text.contains("[proc_fd_1] TX: 4, RX: 2"));
        assert!(text.contains("Latency mean: 200 ns, median: 200 ns"));
        assert!(text.contains("TX throughput: 2.00 msg/sec"));
        assert!(!text.contains("Dropped"));
    }

    #[test]
    fn test_format_worker_without_samples() {
        let stats = WorkerStats::with_outcome(WorkerOutcome::OpenFailed("no such device".into()));
        let text = format_worker("proc_can_1", &stats);
        assert!(text.contains("TX: 0, RX: 0"));
        assert!(!text.contains("Latency"));
        assert!(!text.contains("throughput"));
        assert!(text.contains("Bus open failed: no such device"));
    }

    #[test]
    fn test_format_report() {
        let report = AggregateReport::merge(
            Utc::now(),
            Duration::from_millis(1500),
            vec![
                ("b".to_string(), finished(2, vec![10, 30])),
                ("a".to_string(), finished(1, vec![20])),
            ],
        );
        let text = format_report(&report);

        assert!(text.starts_with("======== Summary ========"));
        assert!(text.find("[a]").unwrap() < text.find("[b]").unwrap());
        assert!(text.contains("[Overall] Latency mean: 20 ns"));
        assert!(text.contains("[Overall] Total TX: 3, RX: 3"));
    }
}
