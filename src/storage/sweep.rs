// src/storage/sweep.rs
//! Sweep coordinator: fans entity work out through the worker pool and, for
//! full sweeps, waits for the whole batch.

use std::collections::BTreeSet;
use std::sync::Arc;

use metrics::gauge;
use tokio::sync::mpsc;

use super::archiver::{self, CompactReport};
use super::cleaner::{self, PurgeReport};
use super::entity::Entity;
use super::pool::Ticket;
use super::Inner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    /// Compaction only; scheduled after each successful append.
    Compact,
    /// Compaction followed by archive purge; startup and daily timer.
    Full,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub entities: usize,
    pub archived: usize,
    pub archive_failures: usize,
    pub purged: usize,
    pub purge_failures: usize,
}

impl SweepSummary {
    fn absorb(&mut self, compact: CompactReport, purge: PurgeReport) {
        self.entities += 1;
        self.archived += compact.archived;
        self.archive_failures += compact.failed;
        self.purged += purge.deleted;
        self.purge_failures += purge.failed;
    }
}

/// Submit one full sweep per distinct entity and wait for all of them.
pub(crate) async fn sweep_all(inner: &Arc<Inner>, entities: &[Entity]) -> SweepSummary {
    let distinct: BTreeSet<&Entity> = entities.iter().collect();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let tickets: Vec<Ticket> = distinct
        .into_iter()
        .map(|entity| {
            let job_inner = Arc::clone(inner);
            let entity = entity.clone();
            let tx = tx.clone();
            inner.pool.submit(async move {
                let reports = sweep_entity(&job_inner, &entity, SweepKind::Full).await;
                let _ = tx.send(reports);
            })
        })
        .collect();
    drop(tx);

    for ticket in tickets {
        ticket.wait().await;
    }

    let mut summary = SweepSummary::default();
    while let Ok((compact, purge)) = rx.try_recv() {
        summary.absorb(compact, purge);
    }

    gauge!("storage_last_sweep_ts").set(inner.clock.now().timestamp() as f64);
    tracing::info!(
        target: "storage",
        entities = summary.entities,
        archived = summary.archived,
        archive_failures = summary.archive_failures,
        purged = summary.purged,
        purge_failures = summary.purge_failures,
        "sweep finished"
    );
    summary
}

/// Queue a compaction pass for one entity without waiting for it.
pub(crate) fn schedule(inner: &Arc<Inner>, entity: Entity, kind: SweepKind) {
    let job_inner = Arc::clone(inner);
    drop(inner.pool.submit(async move {
        let (compact, purge) = sweep_entity(&job_inner, &entity, kind).await;
        tracing::debug!(
            target: "storage",
            entity = %entity,
            archived = compact.archived,
            purged = purge.deleted,
            "background sweep done"
        );
    }));
}

/// Runs compaction (and purge for full sweeps) for `entity` while holding its
/// lock. The blocking filesystem work happens on the blocking pool.
pub(crate) async fn sweep_entity(
    inner: &Inner,
    entity: &Entity,
    kind: SweepKind,
) -> (CompactReport, PurgeReport) {
    let lock = inner.locks.acquire(entity);
    let _guard = lock.lock().await;

    let dir = inner.entity_dir(entity);
    let policy = inner.policy.clone();
    let now = inner.clock.now();

    let work = tokio::task::spawn_blocking(move || {
        let compact = archiver::compact(&dir, &policy, now);
        let purge = match kind {
            SweepKind::Full => cleaner::purge(&dir, &policy, now),
            SweepKind::Compact => PurgeReport::default(),
        };
        (compact, purge)
    });

    match work.await {
        Ok(reports) => reports,
        Err(e) => {
            tracing::error!(target: "storage", entity = %entity, error = %e, "sweep task failed");
            (CompactReport::default(), PurgeReport::default())
        }
    }
}
