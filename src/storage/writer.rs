// src/storage/writer.rs
//! Daily log writer: one append-only `<YYYY-MM-DD>.log` per entity and day.
//!
//! Line format: `[<RFC3339 timestamp>] <payload>`. Dedup only looks at the
//! trailing `DEDUP_WINDOW` lines of today's file, so a payload written longer
//! ago (or on a previous day) can legitimately appear again.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate, SecondsFormat};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub const DEDUP_WINDOW: usize = 200;
pub const LOG_EXTENSION: &str = "log";

/// A matched news item ready to be persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewsRecord {
    pub title: String,
    pub link: String,
    pub description: String,
    pub body: String,
    /// Optional enrichment; rendered into the payload when present.
    pub price_usd: Option<f64>,
}

impl NewsRecord {
    /// Deterministic single-line rendering used both for storage and dedup.
    pub fn payload(&self) -> String {
        let mut out = format!("{} (link: {})", self.title.trim(), self.link.trim());
        if let Some(price) = self.price_usd {
            out.push_str(&format!(" Price: ${price:.2}"));
        }
        out.replace(['\r', '\n'], " ")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub written: usize,
    pub skipped: usize,
}

pub fn daily_log_name(day: NaiveDate) -> String {
    format!("{}.{LOG_EXTENSION}", day.format("%Y-%m-%d"))
}

/// Payload part of a log line: everything after the first `] `.
pub fn line_payload(line: &str) -> Option<&str> {
    line.split_once("] ").map(|(_, payload)| payload)
}

/// Append `records` to today's log under `dir`, skipping payloads already
/// present in the dedup window or earlier in the same batch. Lines written
/// before a failing write stay committed.
pub fn append_records(
    dir: &Path,
    records: &[NewsRecord],
    now: DateTime<Local>,
) -> Result<AppendOutcome, StorageError> {
    fs::create_dir_all(dir).map_err(|e| StorageError::write(dir, e))?;
    let path = dir.join(daily_log_name(now.date_naive()));

    let mut seen = load_seen_window(&path, DEDUP_WINDOW);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| StorageError::write(&path, e))?;

    let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut outcome = AppendOutcome::default();
    for record in records {
        let payload = record.payload();
        if seen.contains(&payload) {
            outcome.skipped += 1;
            continue;
        }
        let line = format!("[{stamp}] {payload}\n");
        file.write_all(line.as_bytes())
            .map_err(|e| StorageError::write(&path, e))?;
        seen.insert(payload);
        outcome.written += 1;
    }

    counter!("storage_lines_written_total").increment(outcome.written as u64);
    counter!("storage_dedup_skipped_total").increment(outcome.skipped as u64);
    Ok(outcome)
}

/// Payloads of the last `window` lines of `path`. A missing file is an empty
/// window; an unreadable one is logged and treated the same way.
fn load_seen_window(path: &Path, window: usize) -> HashSet<String> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return HashSet::new(),
        Err(e) => {
            tracing::warn!(target: "storage", path = %path.display(), error = %e, "dedup window unreadable");
            return HashSet::new();
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    text.lines()
        .rev()
        .filter(|l| !l.is_empty())
        .take(window)
        .filter_map(line_payload)
        .map(str::to_string)
        .collect()
}
