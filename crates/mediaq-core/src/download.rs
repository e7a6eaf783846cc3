//! Download job: one external downloader invocation per attempt.
//!
//! Progress moves `Created → Running → Completed`, or through `Retrying`
//! back to `Running` while attempts remain, ending in `Failed` once they are
//! exhausted. Cancellation always wins: a cancelled job ends in `Cancelled`
//! and is never retried, whatever its attempt count.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::command::{CommandRunner, CommandSpec, Invocation};
use crate::job::{Job, JobId, Progress, RetrySignal};
use crate::retry::{self, ExecutionFailure, RetryDecision, RetryPolicy};
use crate::storage;

/// What to download and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub id: JobId,
    /// Source locator handed to the downloader.
    pub url: String,
    /// Final artifact path; the downloader writes to `<destination>.part` first.
    pub destination: PathBuf,
}

/// Optional per-job tuning. The zero value means: one attempt, no delay, no deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Delay between a failed attempt and the next one.
    pub retry_delay: Duration,
    /// Maximum number of executions (including the first). 0 is treated as 1.
    pub max_attempts: u32,
    /// Deadline for a single execution. `Duration::ZERO` disables it.
    pub max_duration: Duration,
}

impl DownloadOptions {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, self.retry_delay)
    }

    fn deadline(&self) -> Option<Duration> {
        (!self.max_duration.is_zero()).then_some(self.max_duration)
    }
}

pub struct DownloadJob {
    request: DownloadRequest,
    options: DownloadOptions,
    policy: RetryPolicy,
    command: CommandSpec,
    runner: Arc<dyn CommandRunner>,
    token: CancellationToken,
    progress: AtomicI64,
    /// 1-based number of the current (or next) execution.
    attempt: AtomicU32,
}

impl DownloadJob {
    /// Create a job whose cancellation token is a child of `parent` (normally the
    /// engine's root token, so engine shutdown reaches in-flight downloads).
    pub fn new(
        parent: &CancellationToken,
        request: DownloadRequest,
        options: DownloadOptions,
        command: CommandSpec,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            policy: options.retry_policy(),
            request,
            options,
            command,
            runner,
            token: parent.child_token(),
            progress: AtomicI64::new(Progress::Created.code()),
            attempt: AtomicU32::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn destination(&self) -> &Path {
        &self.request.destination
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Store a new progress code. `Cancelled` is sticky and never overwritten.
    fn set_progress(&self, next: Progress) {
        let _ = self
            .progress
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |code| {
                (code != Progress::Cancelled.code()).then_some(next.code())
            });
    }

    async fn run_once(&self) -> Result<(), ExecutionFailure> {
        let destination = &self.request.destination;
        storage::prepare(destination)
            .await
            .map_err(ExecutionFailure::Storage)?;

        let invocation = Invocation {
            program: self.command.program.clone(),
            args: self
                .command
                .render_args(&storage::temp_path(destination), &self.request.url),
            cancel: self.token.clone(),
            deadline: self.options.deadline(),
        };
        self.runner.run(invocation).await?;

        storage::finalize(destination)
            .await
            .map_err(ExecutionFailure::Storage)
    }

    fn outcome_of(&self, attempt: u32, failure: &ExecutionFailure) -> Progress {
        if failure.is_cancelled() || self.token.is_cancelled() {
            return Progress::Cancelled;
        }
        match retry::classify(failure) {
            None => Progress::Cancelled,
            Some(kind) => match self.policy.decide(attempt, kind) {
                RetryDecision::NoRetry => Progress::Failed,
                RetryDecision::RetryAfter(_) => Progress::Retrying,
            },
        }
    }
}

#[async_trait]
impl Job for DownloadJob {
    fn id(&self) -> &str {
        &self.request.id
    }

    fn progress(&self) -> Progress {
        Progress::from_code(self.progress.load(Ordering::SeqCst)).unwrap_or(Progress::Failed)
    }

    async fn execute(&self) -> bool {
        let attempt = self.attempt();
        if self.token.is_cancelled() {
            self.set_progress(Progress::Cancelled);
            return false;
        }

        self.set_progress(Progress::Running);
        tracing::info!(
            job_id = %self.request.id,
            attempt,
            url = %self.request.url,
            "download started"
        );

        match self.run_once().await {
            Ok(()) => {
                self.set_progress(Progress::Completed);
                tracing::info!(
                    job_id = %self.request.id,
                    attempt,
                    "download complete: {}",
                    self.request.destination.display()
                );
                true
            }
            Err(failure) => {
                storage::discard(&self.request.destination).await;
                let next = self.outcome_of(attempt, &failure);
                self.set_progress(next);
                match next {
                    Progress::Cancelled => {
                        tracing::info!(job_id = %self.request.id, attempt, "download cancelled")
                    }
                    Progress::Retrying => tracing::warn!(
                        job_id = %self.request.id,
                        attempt,
                        max_attempts = self.policy.max_attempts(),
                        "download failed, will retry: {}",
                        failure
                    ),
                    _ => tracing::error!(
                        job_id = %self.request.id,
                        attempt,
                        "download failed permanently: {}",
                        failure
                    ),
                }
                false
            }
        }
    }

    fn request_retry(&self) -> Option<RetrySignal> {
        if self.token.is_cancelled() || self.progress() != Progress::Retrying {
            return None;
        }
        let attempt = self.attempt();
        if self.policy.is_exhausted(attempt) {
            tracing::debug!(job_id = %self.request.id, attempt, "max attempts reached");
            return None;
        }

        self.attempt.fetch_add(1, Ordering::SeqCst);
        let delay = self.policy.delay_after(attempt);
        let (tx, rx) = oneshot::channel();
        let token = self.token.clone();
        let job_id = self.request.id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(job_id = %job_id, "retry abandoned");
                }
                _ = tokio::time::sleep(delay) => {
                    tracing::info!(job_id = %job_id, attempt = attempt + 1, "retrying download");
                    let _ = tx.send(());
                }
            }
        });
        Some(rx)
    }

    fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::info!(
                job_id = %self.request.id,
                "cancelling download: {}",
                self.request.destination.display()
            );
        }
        self.token.cancel();
        let _ = self
            .progress
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |code| {
                let terminal = Progress::from_code(code).map_or(true, Progress::is_terminal);
                let running = code == Progress::Running.code();
                // A running execution records `Cancelled` itself when it returns.
                (!terminal && !running).then_some(Progress::Cancelled.code())
            });
    }
}
