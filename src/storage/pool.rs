// src/storage/pool.rs
//! Bounded worker pool: a FIFO job queue drained by a fixed set of workers.
//!
//! The worker count is the admission cap. A job is admitted when a worker
//! pulls it off the queue and holds that worker until it finishes, so no more
//! than `workers` jobs ever run at once no matter how many are submitted.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::gauge;
use tokio::sync::{mpsc, oneshot, watch, Mutex};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Queued {
    job: Job,
    done: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    /// Submitted but not yet finished (queued + running).
    pub outstanding: usize,
}

/// Completion handle for a submitted job. Dropping it detaches the job.
#[derive(Debug)]
pub struct Ticket(oneshot::Receiver<()>);

impl Ticket {
    /// Resolves once the job has finished, panicked, or was never admitted.
    pub async fn wait(self) {
        let _ = self.0.await;
    }
}

#[derive(Debug)]
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<Queued>,
    counters: Arc<Counters>,
    outstanding: Arc<watch::Sender<usize>>,
    workers: usize,
}

impl std::fmt::Debug for Queued {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Queued")
    }
}

impl WorkerPool {
    /// Spawns `workers` (at least one) worker tasks on the current runtime.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Queued>();
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());
        let (outstanding, _) = watch::channel(0usize);
        let outstanding = Arc::new(outstanding);

        for id in 0..workers {
            tokio::spawn(worker_loop(
                id,
                Arc::clone(&rx),
                Arc::clone(&counters),
                Arc::clone(&outstanding),
            ));
        }

        Self {
            tx,
            counters,
            outstanding,
            workers,
        }
    }

    pub fn submit<F>(&self, fut: F) -> Ticket
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        self.outstanding.send_modify(|n| *n += 1);
        let queued = Queued {
            job: Box::pin(fut),
            done,
        };
        if self.tx.send(queued).is_err() {
            // All workers are gone; the ticket resolves immediately.
            self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
            tracing::warn!(target: "storage", "worker pool closed, job dropped");
        }
        Ticket(rx)
    }

    /// Waits until every job submitted so far has finished.
    pub async fn drain(&self) {
        let mut rx = self.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers,
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.counters.peak.load(Ordering::SeqCst),
            outstanding: *self.outstanding.borrow(),
        }
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Queued>>>,
    counters: Arc<Counters>,
    outstanding: Arc<watch::Sender<usize>>,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(Queued { job, done }) = next else {
            break;
        };

        let running = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(running, Ordering::SeqCst);
        gauge!("storage_workers_in_flight").set(running as f64);

        // Run on its own task so a panicking job cannot take the worker down.
        if let Err(e) = tokio::spawn(job).await {
            tracing::error!(target: "storage", worker = id, error = %e, "pool job failed");
        }

        let left = counters.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!("storage_workers_in_flight").set(left as f64);
        outstanding.send_modify(|n| *n = n.saturating_sub(1));
        let _ = done.send(());
    }
    tracing::debug!(target: "storage", worker = id, "worker exiting");
}
