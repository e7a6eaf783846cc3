//! Worker loop and per-job completion handling.

use std::sync::Arc;

use crate::job::{Job, RetrySignal};

use super::JobEngine;

impl JobEngine {
    pub(super) async fn worker_loop(self, worker_id: usize) {
        tracing::debug!(worker_id, "worker started");
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shared.stop.cancelled() => None,
                job = async { self.shared.rx.lock().await.recv().await } => job,
            };
            let Some(job) = next else {
                break;
            };
            self.process(worker_id, job).await;
        }
        tracing::debug!(worker_id, "worker stopped");
    }

    async fn process(&self, worker_id: usize, job: Arc<dyn Job>) {
        let id = job.id().to_string();
        if !self.shared.book.lock().is_active(&id, &job) {
            // Cancelled (or otherwise retired) while it sat in the queue.
            tracing::debug!(worker_id, job_id = %id, "skipping stale queue entry");
            return;
        }

        tracing::debug!(worker_id, job_id = %id, "executing job");
        let ok = {
            let job = Arc::clone(&job);
            match tokio::spawn(async move { job.execute().await }).await {
                Ok(ok) => ok,
                Err(e) => {
                    tracing::error!(worker_id, job_id = %id, "job execution panicked: {}", e);
                    false
                }
            }
        };
        if ok {
            return;
        }

        match job.request_retry() {
            None => {
                let mut book = self.shared.book.lock();
                if book.take_active(&id, &job).is_some() {
                    book.retired.insert(id.clone());
                }
                tracing::debug!(
                    job_id = %id,
                    progress = job.progress().code(),
                    "job finished unsuccessfully"
                );
            }
            Some(signal) => {
                {
                    let mut book = self.shared.book.lock();
                    if book.take_active(&id, &job).is_none() {
                        // Cancelled between execute and request_retry.
                        drop(book);
                        job.cancel();
                        return;
                    }
                    book.pending_retry.insert(id.clone(), Arc::clone(&job));
                }
                tracing::debug!(job_id = %id, "job waiting for retry");
                tokio::spawn(self.clone().await_retry(job, signal));
            }
        }
    }

    async fn await_retry(self, job: Arc<dyn Job>, signal: RetrySignal) {
        match signal.await {
            Ok(()) => self.readmit(job).await,
            Err(_) => {
                let id = job.id().to_string();
                let mut book = self.shared.book.lock();
                if book.take_pending(&id, &job).is_some() {
                    book.retired.insert(id.clone());
                }
                tracing::debug!(job_id = %id, "retry abandoned");
            }
        }
    }
}
