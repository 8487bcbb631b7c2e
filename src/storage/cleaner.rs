// src/storage/cleaner.rs
//! Deletes archive artifacts older than the archive life. Runs under the
//! entity lock, right after compaction.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use metrics::counter;

use super::archiver::{cutoff, list_files, modified_at, ARCHIVE_EXTENSION};
use super::policy::RetentionPolicy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub deleted: usize,
    pub failed: usize,
}

pub fn purge(entity_dir: &Path, policy: &RetentionPolicy, now: DateTime<Utc>) -> PurgeReport {
    let mut report = PurgeReport::default();
    let cutoff = cutoff(now, policy.archive_life);
    let archive_dir = entity_dir.join(&policy.archive_subdir);

    for path in list_files(&archive_dir, ARCHIVE_EXTENSION) {
        let modified = match modified_at(&path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if modified >= cutoff {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(target: "storage", path = %path.display(), "archive expired");
                counter!("storage_purged_total").increment(1);
                report.deleted += 1;
            }
            Err(e) => {
                tracing::warn!(target: "storage", path = %path.display(), error = %e, "failed to delete expired archive");
                counter!("storage_cleanup_errors_total").increment(1);
                report.failed += 1;
            }
        }
    }
    report
}
