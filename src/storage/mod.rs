// src/storage/mod.rs
//! Per-entity news storage: daily append-only logs, zip compaction past the
//! retention window, and purge of expired archives.
//!
//! Layout under the root:
//! ```text
//! <root>/<entity>/<YYYY-MM-DD>.log
//! <root>/<entity>/<archive-subdir>/<YYYY-MM-DD>.log.zip
//! ```
//!
//! All compaction/purge work goes through one bounded worker pool and runs
//! under the entity's lock, whether it was triggered by a write, the startup
//! sweep or the daily timer.

pub mod archiver;
pub mod cleaner;
pub mod clock;
pub mod entity;
pub mod locks;
pub mod policy;
pub mod pool;
pub mod sweep;
pub mod writer;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::Entity;
pub use policy::RetentionPolicy;
pub use pool::PoolStats;
pub use sweep::{SweepKind, SweepSummary};
pub use writer::{AppendOutcome, NewsRecord};

use crate::error::StorageError;
use locks::EntityLocks;
use pool::WorkerPool;

pub(crate) struct Inner {
    root: PathBuf,
    policy: RetentionPolicy,
    locks: EntityLocks,
    pool: WorkerPool,
    clock: Arc<dyn Clock>,
}

impl Inner {
    fn entity_dir(&self, entity: &Entity) -> PathBuf {
        self.root.join(entity.as_str())
    }
}

/// Cheap to clone; clones share the lock registry and worker pool.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("root", &self.inner.root)
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Prepare directories for `entities`, register their locks and run one
    /// full sweep before returning. Must be called inside a Tokio runtime.
    pub async fn init(
        root: impl Into<PathBuf>,
        entities: &[Entity],
        policy: RetentionPolicy,
    ) -> Result<Self, StorageError> {
        Self::init_with_clock(root, entities, policy, Arc::new(SystemClock)).await
    }

    pub async fn init_with_clock(
        root: impl Into<PathBuf>,
        entities: &[Entity],
        policy: RetentionPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StorageError> {
        crate::metrics::describe_metrics();
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::init(&root, e))?;

        let inner = Inner {
            pool: WorkerPool::new(policy.max_workers),
            locks: EntityLocks::new(),
            root,
            policy,
            clock,
        };

        for entity in entities {
            let archive_dir = inner.entity_dir(entity).join(&inner.policy.archive_subdir);
            tokio::fs::create_dir_all(&archive_dir)
                .await
                .map_err(|e| StorageError::init(&archive_dir, e))?;
            inner.locks.acquire(entity);
        }

        tracing::info!(
            target: "storage",
            root = %inner.root.display(),
            entities = entities.len(),
            max_workers = inner.policy.max_workers,
            log_retention_secs = inner.policy.log_retention.as_secs(),
            archive_life_secs = inner.policy.archive_life.as_secs(),
            "storage ready"
        );

        let storage = Self {
            inner: Arc::new(inner),
        };
        storage.sweep_all(entities).await;
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.inner.policy
    }

    pub fn entity_dir(&self, entity: &Entity) -> PathBuf {
        self.inner.entity_dir(entity)
    }

    pub fn archive_dir(&self, entity: &Entity) -> PathBuf {
        self.entity_dir(entity).join(&self.inner.policy.archive_subdir)
    }

    /// Append to today's log for `entity`, then queue a compaction pass for it.
    /// The compaction is not awaited.
    pub async fn append_records(
        &self,
        entity: &Entity,
        records: Vec<NewsRecord>,
    ) -> Result<AppendOutcome, StorageError> {
        let dir = self.entity_dir(entity);
        let now = self.inner.clock.now().with_timezone(&Local);

        let task_dir = dir.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            writer::append_records(&task_dir, &records, now)
        })
        .await
        .map_err(|e| StorageError::write(&dir, io::Error::other(e)))??;

        tracing::debug!(
            target: "storage",
            entity = %entity,
            written = outcome.written,
            skipped = outcome.skipped,
            "records appended"
        );
        self.schedule_compaction(entity.clone());
        Ok(outcome)
    }

    pub fn schedule_compaction(&self, entity: Entity) {
        sweep::schedule(&self.inner, entity, SweepKind::Compact);
    }

    /// Compact and purge every entity in `entities`, at most `max_workers` at
    /// a time. Never fails; per-file errors are logged and counted.
    pub async fn sweep_all(&self, entities: &[Entity]) -> SweepSummary {
        sweep::sweep_all(&self.inner, entities).await
    }

    /// Wait for all queued and running background work to finish.
    pub async fn drain(&self) {
        self.inner.pool.drain().await;
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    pub fn registered_locks(&self) -> usize {
        self.inner.locks.len()
    }
}
