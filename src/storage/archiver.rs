// src/storage/archiver.rs
//! Compacts daily logs past the retention window into single-entry zip
//! archives. Callers must hold the entity lock.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, Timelike, Utc};
use metrics::counter;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::policy::RetentionPolicy;
use super::writer::LOG_EXTENSION;
use crate::error::ArchiveError;

pub const ARCHIVE_EXTENSION: &str = "zip";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactReport {
    pub archived: usize,
    pub failed: usize,
}

/// Archive every `*.log` directly under `entity_dir` whose mtime is strictly
/// older than `now - policy.log_retention`. A source log is removed only after
/// its artifact has been written, synced and renamed into place.
pub fn compact(entity_dir: &Path, policy: &RetentionPolicy, now: DateTime<Utc>) -> CompactReport {
    let mut report = CompactReport::default();
    let cutoff = cutoff(now, policy.log_retention);
    let archive_dir = entity_dir.join(&policy.archive_subdir);

    for path in list_files(entity_dir, LOG_EXTENSION) {
        match modified_at(&path) {
            Ok(modified) if modified < cutoff => {}
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(target: "storage", path = %path.display(), error = %e, "stat failed, skipping");
                continue;
            }
        }

        match archive_file(&path, &archive_dir) {
            Ok(artifact) => match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(
                        target: "storage",
                        source = %path.display(),
                        artifact = %artifact.display(),
                        "log archived"
                    );
                    counter!("storage_archived_total").increment(1);
                    report.archived += 1;
                }
                Err(e) => {
                    // Artifact exists; the next sweep rewrites it and retries the delete.
                    tracing::warn!(target: "storage", path = %path.display(), error = %e, "archived log not removed");
                    counter!("storage_archive_errors_total").increment(1);
                    report.failed += 1;
                }
            },
            Err(e) => {
                tracing::warn!(target: "storage", path = %path.display(), error = %e, "archiving failed, source kept");
                counter!("storage_archive_errors_total").increment(1);
                report.failed += 1;
            }
        }
    }
    report
}

/// Write `<archive_dir>/<file name>.zip` holding `src` as its only entry.
/// The artifact is built under a `.tmp` name and renamed once complete.
pub fn archive_file(src: &Path, archive_dir: &Path) -> Result<PathBuf, ArchiveError> {
    fs::create_dir_all(archive_dir).map_err(|e| ArchiveError::io(archive_dir, e))?;

    let name = src.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        ArchiveError::io(
            src,
            io::Error::new(io::ErrorKind::InvalidInput, "log file name is not UTF-8"),
        )
    })?;
    let final_path = archive_dir.join(format!("{name}.{ARCHIVE_EXTENSION}"));
    let tmp_path = archive_dir.join(format!("{name}.{ARCHIVE_EXTENSION}.tmp"));

    let result = write_zip(src, name, &tmp_path).and_then(|()| {
        fs::rename(&tmp_path, &final_path).map_err(|e| ArchiveError::io(&final_path, e))
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result.map(|()| final_path)
}

fn write_zip(src: &Path, entry_name: &str, dest: &Path) -> Result<(), ArchiveError> {
    let mut input = File::open(src).map_err(|e| ArchiveError::io(src, e))?;
    let out = File::create(dest).map_err(|e| ArchiveError::io(dest, e))?;

    let mut zip = ZipWriter::new(out);
    let mut options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    if let Some(ts) = entry_timestamp(src) {
        options = options.last_modified_time(ts);
    }
    zip.start_file(entry_name, options)?;
    io::copy(&mut input, &mut zip).map_err(|e| ArchiveError::io(src, e))?;
    let out = zip.finish()?;
    out.sync_all().map_err(|e| ArchiveError::io(dest, e))?;
    Ok(())
}

/// Source mtime as a zip (DOS, local time) timestamp. `None` when the mtime is
/// unreadable or outside the 1980..=2107 range the format can hold.
fn entry_timestamp(src: &Path) -> Option<zip::DateTime> {
    let local = modified_at(src).ok()?.with_timezone(&Local);
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

/// `now - age`, saturating at the earliest representable instant.
pub(crate) fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub(crate) fn modified_at(path: &Path) -> io::Result<DateTime<Utc>> {
    Ok(fs::metadata(path)?.modified()?.into())
}

/// Regular files directly under `dir` with extension `ext`, sorted by name.
/// A missing directory yields nothing.
pub(crate) fn list_files(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(it) => it,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(target: "storage", dir = %dir.display(), error = %e, "cannot list directory");
            return Vec::new();
        }
    };

    let mut out: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some(ext))
        .collect();
    out.sort();
    out
}
