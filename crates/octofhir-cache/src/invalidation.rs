//! Background cache invalidation.
//!
//! Write paths hand invalidations to a bounded queue and return immediately.
//! A fixed pool of workers drains the queue. A full queue drops the job; the
//! affected entries then lapse with their TTL.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::config::InvalidationConfig;
use crate::manager::CacheManager;
use crate::metrics;

/// One unit of invalidation work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationJob {
    /// Delete these keys.
    Keys(Vec<String>),
    /// Delete every key starting with this prefix.
    Pattern(String),
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<InvalidationJob>>>;

/// Bounded queue plus worker pool.
pub struct InvalidationQueue {
    sender: Mutex<Option<mpsc::Sender<InvalidationJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl InvalidationQueue {
    /// Spawns `config.workers` tasks on the current runtime.
    pub fn start(manager: CacheManager, config: &InvalidationConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..config.workers.max(1))
            .map(|id| tokio::spawn(run_worker(id, manager.clone(), rx.clone())))
            .collect();

        tracing::info!(
            workers = config.workers,
            capacity = config.queue_capacity,
            "Cache invalidation workers started"
        );

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Enqueues without waiting. Returns `false` if the job was dropped
    /// because the queue is full or shut down.
    pub fn submit(&self, job: InvalidationJob) -> bool {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            tracing::warn!(job = ?job, "Invalidation queue shut down, job dropped");
            metrics::record_invalidation_dropped("closed");
            return false;
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                tracing::warn!(job = ?job, "Invalidation queue full, job dropped");
                metrics::record_invalidation_dropped("full");
                false
            }
            Err(TrySendError::Closed(job)) => {
                tracing::warn!(job = ?job, "Invalidation workers gone, job dropped");
                metrics::record_invalidation_dropped("closed");
                false
            }
        }
    }

    /// Closes the queue and waits for the workers to finish what is queued.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Invalidation worker panicked");
            }
        }
        tracing::info!("Cache invalidation workers stopped");
    }
}

async fn run_worker(id: usize, manager: CacheManager, rx: SharedReceiver) {
    loop {
        // Hold the receiver only while waiting, not while processing.
        let job = rx.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        let result = match &job {
            InvalidationJob::Keys(keys) => manager.delete(keys).await,
            InvalidationJob::Pattern(pattern) => manager.delete_by_pattern(pattern).await,
        };
        if let Err(e) = result {
            tracing::warn!(worker = id, job = ?job, error = %e, "Cache invalidation failed");
            metrics::record_invalidation_failed();
        }
    }
    tracing::debug!(worker = id, "Invalidation worker exiting");
}
