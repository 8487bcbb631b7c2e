// src/storage/policy.rs
use std::path::{Component, Path};
use std::time::Duration;

pub const DEFAULT_LOG_RETENTION: Duration = Duration::from_secs(14 * 24 * 3600);
pub const DEFAULT_ARCHIVE_LIFE: Duration = Duration::from_secs(90 * 24 * 3600);
pub const DEFAULT_MAX_WORKERS: usize = 5;
pub const DEFAULT_ARCHIVE_SUBDIR: &str = "archive";

/// Resolved once at startup and handed to `Storage::init`; never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Daily logs older than this are compacted into archives.
    pub log_retention: Duration,
    /// Archives older than this are deleted.
    pub archive_life: Duration,
    pub max_workers: usize,
    pub archive_subdir: String,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            log_retention: DEFAULT_LOG_RETENTION,
            archive_life: DEFAULT_ARCHIVE_LIFE,
            max_workers: DEFAULT_MAX_WORKERS,
            archive_subdir: DEFAULT_ARCHIVE_SUBDIR.to_string(),
        }
    }
}

impl RetentionPolicy {
    /// Build a policy from optional raw values; zero, empty or unusable values
    /// fall back to the defaults.
    pub fn resolve(
        log_retention: Option<Duration>,
        archive_life: Option<Duration>,
        max_workers: Option<usize>,
        archive_subdir: Option<&str>,
    ) -> Self {
        let d = Self::default();
        let archive_subdir = match archive_subdir.map(str::trim) {
            Some(name) if is_single_component(name) => name.to_string(),
            Some("") | None => d.archive_subdir,
            Some(bad) => {
                tracing::warn!(
                    target: "storage",
                    archive_dir = bad,
                    "archive dir must be a plain directory name, using default"
                );
                d.archive_subdir
            }
        };
        Self {
            log_retention: log_retention
                .filter(|v| !v.is_zero())
                .unwrap_or(d.log_retention),
            archive_life: archive_life
                .filter(|v| !v.is_zero())
                .unwrap_or(d.archive_life),
            max_workers: max_workers.filter(|&n| n > 0).unwrap_or(d.max_workers),
            archive_subdir,
        }
    }
}

fn is_single_component(name: &str) -> bool {
    let mut comps = Path::new(name).components();
    matches!(
        (comps.next(), comps.next()),
        (Some(Component::Normal(_)), None)
    )
}
