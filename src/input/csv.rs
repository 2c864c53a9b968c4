use anyhow::{Context, Result};
use crate::core::{RawId, TraceRecord};
use crate::input::{sort_by_timestamp, split_part, TracePart};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load a recorded trace from a CSV file
///
/// Supports flexible column names:
/// - timestamp,AID,Data
/// - time,can_id,payload
/// - ts,id,hex
///
/// `limit` keeps only the first rows of the file, before any cleaning.
/// Rows missing a timestamp, id or payload are dropped, as are rows whose
/// timestamp is not a finite number. The result is sorted by timestamp.
pub fn load_trace(path: impl AsRef<Path>, limit: Option<usize>) -> Result<Vec<TraceRecord>> {
    load_trace_part(path, limit, None)
}

/// Like [`load_trace`], but keeps only `part` of the limited raw rows
///
/// The split counts every row, incomplete ones included; each part is then
/// cleaned and sorted on its own.
pub fn load_trace_part(
    path: impl AsRef<Path>,
    limit: Option<usize>,
    part: Option<TracePart>,
) -> Result<Vec<TraceRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open trace {}", path.display()))?;
    let records = parse_trace_part(file, limit, part)
        .with_context(|| format!("Failed to read trace {}", path.display()))?;

    match part {
        Some(TracePart { index, of }) => info!("Loaded {} records from {} (part {} of {})",
                                               records.len(), path.display(), index + 1, of),
        None => info!("Loaded {} records from {}", records.len(), path.display()),
    }
    Ok(records)
}

/// Parse CSV trace data from any reader
pub fn parse_trace<R: Read>(reader: R, limit: Option<usize>) -> Result<Vec<TraceRecord>> {
    parse_trace_part(reader, limit, None)
}

/// Parse CSV trace data, keeping only `part` of the limited raw rows
pub fn parse_trace_part<R: Read>(
    reader: R,
    limit: Option<usize>,
    part: Option<TracePart>,
) -> Result<Vec<TraceRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let (time_idx, id_idx, data_idx) = detect_columns(&headers)?;

    let rows = rdr
        .records()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(row, result)| {
            result
                .map(|record| (row + 1, record))
                .with_context(|| format!("Failed to read CSV row {}", row + 1))
        })
        .collect::<Result<Vec<_>>>()?;

    let rows = match part {
        Some(TracePart { index, of }) => split_part(&rows, index, of),
        None => rows,
    };

    let mut records = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;

    for (row, record) in &rows {
        let field = |idx: usize| record.get(idx).filter(|s| !s.is_empty());
        let (Some(time), Some(id), Some(data)) = (field(time_idx), field(id_idx), field(data_idx)) else {
            debug!("Row {}: missing field, dropped", row);
            dropped += 1;
            continue;
        };

        let Some(timestamp) = time.parse::<f64>().ok().filter(|t| t.is_finite()) else {
            debug!("Row {}: non-numeric timestamp {:?}, dropped", row, time);
            dropped += 1;
            continue;
        };

        records.push(TraceRecord {
            timestamp,
            arbitration_id: RawId::Text(id.to_string()),
            payload_hex: data.to_string(),
        });
    }

    if dropped > 0 {
        warn!("Dropped {} incomplete rows", dropped);
    }

    sort_by_timestamp(&mut records);
    Ok(records)
}

/// Detect column indices from CSV headers
fn detect_columns(headers: &csv::StringRecord) -> Result<(usize, usize, usize)> {
    let time_idx = find_column(headers, &["timestamp", "time", "t", "ts"])?;
    let id_idx = find_column(headers, &["aid", "id", "can_id", "arbitration_id", "msg_id", "message_id", "addr"])?;
    let data_idx = find_column(headers, &["data", "payload", "hex", "bytes"])?;

    Ok((time_idx, id_idx, data_idx))
}

/// Find a column by checking possible names
fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Result<usize> {
    for (idx, header) in headers.iter().enumerate() {
        let header_lower = header.to_lowercase();
        if names.iter().any(|&name| header_lower == name) {
            return Ok(idx);
        }
    }

    anyhow::bail!("Could not find column with names: {:?}", names)
}
