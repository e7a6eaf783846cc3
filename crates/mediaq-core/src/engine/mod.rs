//! Job engine: a fixed pool of workers draining one bounded queue.
//!
//! Bookkeeping (`active`, `pending_retry`, retired ids) lives behind a single
//! mutex so submit, cancel, worker completion and retry waiters never race.
//! Every job token is derived from the engine's root token; shutdown cancels
//! the root, which reaches in-flight executions and pending retries.

mod book;
mod worker;


use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::job::{Job, JobId, Progress};

use book::Bookkeeping;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {id} already finished with {progress}")]
    AlreadyTerminal { id: JobId, progress: Progress },
    #[error("engine workers already started")]
    AlreadyRunning,
    #[error("engine is shutting down")]
    ShuttingDown,
}

/// Result of a submission that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Recorded as active and queued for a worker.
    Queued,
    /// The id is already known (active, pending retry, or retired); nothing changed.
    Duplicate,
}

/// Point-in-time counters for status listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub workers: usize,
    pub active: usize,
    pub pending_retry: usize,
    pub queued: usize,
    /// Cancelled or failed ids remembered to refuse resubmission.
    pub retired: usize,
}

struct Shared {
    workers: usize,
    capacity: usize,
    book: Mutex<Bookkeeping>,
    tx: mpsc::Sender<Arc<dyn Job>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Arc<dyn Job>>>,
    /// Workers stop dequeuing once this fires.
    stop: CancellationToken,
    /// Parent of every job token.
    root: CancellationToken,
    tasks: Mutex<Option<JoinSet<()>>>,
    started: AtomicBool,
}

/// Cheap-to-clone handle to the worker pool.
#[derive(Clone)]
pub struct JobEngine {
    shared: Arc<Shared>,
}

impl JobEngine {
    pub fn new(cfg: &EngineConfig) -> Self {
        let capacity = cfg.queue_capacity();
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            shared: Arc::new(Shared {
                workers: cfg.workers.max(1),
                capacity,
                book: Mutex::new(Bookkeeping::default()),
                tx,
                rx: tokio::sync::Mutex::new(rx),
                stop: CancellationToken::new(),
                root: CancellationToken::new(),
                tasks: Mutex::new(None),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Token every job should derive its own cancellation from.
    pub fn root_token(&self) -> CancellationToken {
        self.shared.root.clone()
    }

    pub fn workers(&self) -> usize {
        self.shared.workers
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.stop.is_cancelled()
    }

    pub fn stats(&self) -> EngineStats {
        let book = self.shared.book.lock();
        EngineStats {
            workers: self.shared.workers,
            active: book.active.len(),
            pending_retry: book.pending_retry.len(),
            queued: self.shared.capacity - self.shared.tx.capacity(),
            retired: book.retired.len(),
        }
    }

    /// Record `job` as active and queue it. Blocks while the queue is full,
    /// until a worker makes room or the engine shuts down.
    pub async fn submit(&self, job: Arc<dyn Job>) -> Result<Admission, EngineError> {
        if self.is_shutting_down() {
            return Err(EngineError::ShuttingDown);
        }
        let id = job.id().to_string();
        {
            let mut book = self.shared.book.lock();
            if book.knows(&id) {
                tracing::debug!(job_id = %id, "duplicate submission ignored");
                return Ok(Admission::Duplicate);
            }
            book.active.insert(id.clone(), Arc::clone(&job));
        }
        tracing::debug!(job_id = %id, "job submitted");
        self.enqueue(id, job).await?;
        Ok(Admission::Queued)
    }

    /// Progress of a job that is active or waiting to be retried.
    pub fn progress(&self, id: &str) -> Result<Progress, EngineError> {
        self.shared
            .book
            .lock()
            .lookup(id)
            .map(|job| job.progress())
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    /// Cancel an active or pending-retry job. Returns the progress observed just
    /// before cancellation. Terminal jobs are left alone and reported as such.
    pub fn cancel(&self, id: &str) -> Result<Progress, EngineError> {
        let (job, before) = {
            let mut book = self.shared.book.lock();
            let job = book
                .lookup(id)
                .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            let before = job.progress();
            if before.is_terminal() {
                return Err(EngineError::AlreadyTerminal {
                    id: id.to_string(),
                    progress: before,
                });
            }
            book.retire(id);
            (job, before)
        };
        job.cancel();
        tracing::info!(job_id = %id, before = before.code(), "job cancelled");
        Ok(before)
    }

    /// Start the workers. Must be called from within a tokio runtime, once.
    pub fn run(&self) -> Result<(), EngineError> {
        if self.is_shutting_down() {
            return Err(EngineError::ShuttingDown);
        }
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        let mut set = JoinSet::new();
        for worker_id in 0..self.shared.workers {
            let engine = self.clone();
            set.spawn(engine.worker_loop(worker_id));
        }
        *self.shared.tasks.lock() = Some(set);
        tracing::info!(
            workers = self.shared.workers,
            queue_capacity = self.shared.capacity,
            "job engine started"
        );
        Ok(())
    }

    /// Stop accepting work, cancel every job (queued, in flight or waiting to
    /// retry), and wait for all worker loops to exit. Idempotent.
    pub async fn shutdown(&self) {
        self.shared.stop.cancel();
        self.shared.root.cancel();
        self.close_queue().await;
        let tasks = self.shared.tasks.lock().take();
        if let Some(mut set) = tasks {
            drain(&mut set).await;
        }
        self.abandon_queued().await;
        tracing::info!("job engine stopped");
    }

    /// Stop accepting work and give in-flight jobs up to `grace` to finish before
    /// cancelling them. Returns once all worker loops have exited.
    pub async fn shutdown_graceful(&self, grace: Duration) {
        self.shared.stop.cancel();
        self.close_queue().await;
        let tasks = self.shared.tasks.lock().take();
        if let Some(mut set) = tasks {
            if tokio::time::timeout(grace, drain(&mut set)).await.is_err() {
                tracing::warn!(?grace, "grace period elapsed, cancelling in-flight jobs");
                self.shared.root.cancel();
                drain(&mut set).await;
            }
        }
        self.shared.root.cancel();
        self.abandon_queued().await;
        tracing::info!("job engine stopped");
    }

    async fn close_queue(&self) {
        self.shared.rx.lock().await.close();
    }

    /// Cancel and retire jobs still sitting in the closed queue. Workers have
    /// exited by now, so nothing else will ever dequeue them.
    async fn abandon_queued(&self) {
        let mut rx = self.shared.rx.lock().await;
        while let Ok(job) = rx.try_recv() {
            let id = job.id().to_string();
            let abandoned = {
                let mut book = self.shared.book.lock();
                let taken = book.take_active(&id, &job).is_some();
                if taken {
                    book.retired.insert(id.clone());
                }
                taken
            };
            if abandoned {
                job.cancel();
                tracing::debug!(job_id = %id, "queued job cancelled by shutdown");
            }
        }
    }

    /// Push onto the bounded queue; on shutdown the job is dropped from bookkeeping.
    async fn enqueue(&self, id: JobId, job: Arc<dyn Job>) -> Result<(), EngineError> {
        let sent = tokio::select! {
            biased;
            _ = self.shared.stop.cancelled() => false,
            res = self.shared.tx.send(Arc::clone(&job)) => res.is_ok(),
        };
        if !sent {
            let taken = {
                let mut book = self.shared.book.lock();
                let taken = book.take_active(&id, &job).is_some();
                if taken {
                    book.retired.insert(id.clone());
                }
                taken
            };
            if taken {
                job.cancel();
            }
            tracing::debug!(job_id = %id, "queue closed, job not admitted");
            return Err(EngineError::ShuttingDown);
        }
        Ok(())
    }

    /// Move a job whose retry signal fired from `pending_retry` back to `active`
    /// and queue it. A job cancelled while waiting is no longer pending and stays out.
    async fn readmit(&self, job: Arc<dyn Job>) {
        let id = job.id().to_string();
        {
            let mut book = self.shared.book.lock();
            if book.take_pending(&id, &job).is_none() {
                tracing::debug!(job_id = %id, "retry suppressed, job no longer pending");
                return;
            }
            book.active.insert(id.clone(), Arc::clone(&job));
        }
        if self.enqueue(id.clone(), job).await.is_ok() {
            tracing::debug!(job_id = %id, "job re-queued for retry");
        }
    }
}

async fn drain(set: &mut JoinSet<()>) {
    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            tracing::error!("worker task failed: {}", e);
        }
    }
}
