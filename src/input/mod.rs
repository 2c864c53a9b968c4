pub mod csv;

pub use self::csv::{load_trace, load_trace_part, parse_trace, parse_trace_part};

use crate::core::TraceRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Slice `index` of `of` taken from the raw rows of a trace file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracePart {
    pub index: usize,
    pub of: usize,
}

/// Total order on timestamps; NaN sorts after every number
fn timestamp_order(a: f64, b: f64) -> Ordering {
    a.is_nan().cmp(&b.is_nan()).then_with(|| a.total_cmp(&b))
}

/// Whether timestamps never decrease
pub fn is_sorted(records: &[TraceRecord]) -> bool {
    records
        .windows(2)
        .all(|pair| timestamp_order(pair[0].timestamp, pair[1].timestamp) != Ordering::Greater)
}

/// Stable ascending sort by timestamp; rows sharing a timestamp keep file order
pub fn sort_by_timestamp(records: &mut [TraceRecord]) {
    records.sort_by(|a, b| timestamp_order(a.timestamp, b.timestamp));
}

/// Part `index` of `of` contiguous, nearly equal slices
///
/// With `of == 2` the first half holds `len / 2` items and the second the rest.
pub fn split_part<T: Clone>(items: &[T], index: usize, of: usize) -> Vec<T> {
    if of == 0 || index >= of {
        return Vec::new();
    }
    let len = items.len();
    let start = index * len / of;
    let end = (index + 1) * len / of;
    items[start..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(timestamps: &[f64]) -> Vec<TraceRecord> {
        timestamps
            .iter()
            .enumerate()
            .map(|(i, &ts)| TraceRecord::new(ts, i as u32, "00"))
            .collect()
    }

    #[test]
    fn test_sort_is_stable() {
        let mut records = trace(&[2.0, 1.0, 2.0, 0.5]);
        assert!(!is_sorted(&records));

        sort_by_timestamp(&mut records);
        assert!(is_sorted(&records));
        let ids: Vec<_> = records.iter().map(|r| r.arbitration_id.to_string()).collect();
        assert_eq!(ids, vec!["3", "1", "0", "2"]);
    }

    #[test]
    fn test_nan_sorts_last() {
        let mut records: Vec<TraceRecord> = (0..200)
            .map(|i| {
                let ts = if i % 7 == 0 { f64::NAN } else { ((i * 37) % 101) as f64 };
                TraceRecord::new(ts, i as u32, "00")
            })
            .collect();
        records.push(TraceRecord::new(-f64::NAN, 999u32, "00"));

        sort_by_timestamp(&mut records);
        assert!(is_sorted(&records));

        let finite: Vec<f64> = records.iter().map(|r| r.timestamp).take_while(|t| !t.is_nan()).collect();
        assert_eq!(finite.len(), 200 - 29);
        assert!(finite.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(records[finite.len()..].iter().all(|r| r.timestamp.is_nan()));
    }

    #[test]
    fn test_split_halves() {
        let records = trace(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let first = split_part(&records, 0, 2);
        let second = split_part(&records, 1, 2);
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].timestamp, 2.0);

        assert!(split_part(&records, 2, 2).is_empty());
        assert!(split_part(&records, 0, 0).is_empty());
    }
}
