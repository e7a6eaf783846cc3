//! Download service: the request-facing boundary over the job engine.
//!
//! Accepts a source URL, derives a job id and an artifact id, builds a
//! `DownloadJob` from configuration and hands it to the engine. Status and
//! cancel map engine outcomes onto client-facing errors.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::command::{CommandRunner, CommandSpec, ProcessRunner};
use crate::config::{DownloadConfig, MediaqConfig, RetryConfig};
use crate::download::{DownloadJob, DownloadOptions, DownloadRequest};
use crate::engine::{Admission, EngineError, JobEngine};
use crate::job::{JobId, Progress};

/// Extension given to every artifact id.
pub const ARTIFACT_EXTENSION: &str = "mp4";

/// Identifiers returned to the client after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub job_id: JobId,
    pub artifact_id: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {id} already finished with {progress}")]
    AlreadyTerminal { id: JobId, progress: Progress },
    #[error("service is shutting down")]
    Unavailable,
}

impl From<EngineError> for ServiceError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(id) => ServiceError::NotFound(id),
            EngineError::AlreadyTerminal { id, progress } => {
                ServiceError::AlreadyTerminal { id, progress }
            }
            EngineError::AlreadyRunning | EngineError::ShuttingDown => ServiceError::Unavailable,
        }
    }
}

#[derive(Clone)]
pub struct DownloadService {
    engine: JobEngine,
    root: PathBuf,
    command: CommandSpec,
    options: DownloadOptions,
    runner: Arc<dyn CommandRunner>,
}

impl DownloadService {
    pub fn new(
        engine: JobEngine,
        download: &DownloadConfig,
        retry: &RetryConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            engine,
            root: download.root.clone(),
            command: download.command(),
            options: DownloadOptions {
                retry_delay: retry.delay(),
                max_attempts: retry.max_attempts,
                max_duration: download.max_duration(),
            },
            runner,
        }
    }

    /// Service running the configured downloader as a child process.
    pub fn from_config(engine: JobEngine, cfg: &MediaqConfig) -> Self {
        Self::new(engine, &cfg.download, &cfg.retry, Arc::new(ProcessRunner))
    }

    pub fn engine(&self) -> &JobEngine {
        &self.engine
    }

    /// Directory artifacts are written to.
    pub fn download_root(&self) -> &Path {
        &self.root
    }

    pub async fn submit(&self, url: &str) -> Result<Submission, ServiceError> {
        let url = validate_url(url)?;
        let job_id = uuid::Uuid::new_v4().to_string();
        let artifact_id = format!("{}.{}", uuid::Uuid::new_v4(), ARTIFACT_EXTENSION);

        let job = DownloadJob::new(
            &self.engine.root_token(),
            DownloadRequest {
                id: job_id.clone(),
                url,
                destination: self.root.join(&artifact_id),
            },
            self.options,
            self.command.clone(),
            Arc::clone(&self.runner),
        );

        match self.engine.submit(Arc::new(job)).await? {
            Admission::Queued => {}
            // Fresh v4 ids do not collide in practice; treat it as a transient refusal.
            Admission::Duplicate => return Err(ServiceError::Unavailable),
        }
        tracing::info!(job_id = %job_id, artifact_id = %artifact_id, "download queued");
        Ok(Submission {
            job_id,
            artifact_id,
        })
    }

    pub fn status(&self, job_id: &str) -> Result<Progress, ServiceError> {
        Ok(self.engine.progress(job_id)?)
    }

    pub fn cancel(&self, job_id: &str) -> Result<Progress, ServiceError> {
        Ok(self.engine.cancel(job_id)?)
    }
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(raw: &str) -> Result<String, ServiceError> {
    let invalid = |reason: &str| ServiceError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty"));
    }
    let parsed = url::Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(&format!("unsupported scheme {other}"))),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(parsed.to_string())
}
