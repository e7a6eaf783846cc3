//! The job contract shared by the engine and every job kind.
//!
//! A job has a stable id, a coarse progress code readable from any task, a
//! one-shot `execute`, a retry schedule and an idempotent `cancel`. The engine
//! only talks to jobs through this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

/// Opaque job identifier; the only external handle to a job.
pub type JobId = String;

/// One-shot wakeup that re-admits a failed job. Resolves with `Err` when the
/// retry was abandoned (job cancelled or engine shutting down).
pub type RetrySignal = oneshot::Receiver<()>;

/// Coarse progress of a job, with stable integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Progress {
    /// Constructed, not yet executed.
    Created,
    /// An execution is in flight.
    Running,
    /// The last execution succeeded. Terminal.
    Completed,
    /// The last execution failed and another attempt is allowed.
    Retrying,
    /// Attempts exhausted or the failure is not retryable. Terminal.
    Failed,
    /// Cancelled by a caller or by engine shutdown. Terminal.
    Cancelled,
}

impl Progress {
    pub const fn code(self) -> i64 {
        match self {
            Progress::Created => 0,
            Progress::Running => 30,
            Progress::Completed => 100,
            Progress::Retrying => -2,
            Progress::Failed => -1,
            Progress::Cancelled => -3,
        }
    }

    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Progress::Created),
            30 => Some(Progress::Running),
            100 => Some(Progress::Completed),
            -2 => Some(Progress::Retrying),
            -1 => Some(Progress::Failed),
            -3 => Some(Progress::Cancelled),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Progress::Completed | Progress::Failed | Progress::Cancelled
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Progress::Created => "created",
            Progress::Running => "running",
            Progress::Completed => "completed",
            Progress::Retrying => "retrying",
            Progress::Failed => "failed",
            Progress::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

impl From<Progress> for i64 {
    fn from(p: Progress) -> i64 {
        p.code()
    }
}

impl TryFrom<i64> for Progress {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Progress::from_code(code).ok_or_else(|| format!("unknown progress code {}", code))
    }
}

/// A unit of cancellable, retryable work run by the engine.
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable id, unique within the engine.
    fn id(&self) -> &str;

    /// Current progress; safe to call while `execute` is running.
    fn progress(&self) -> Progress;

    /// Run one attempt to completion or failure. Returns true on success.
    /// Must leave `progress` updated and return promptly once cancelled.
    async fn execute(&self) -> bool;

    /// If another attempt is allowed, schedule a signal (typically after a delay)
    /// and return it. Returns `None`, doing nothing, when no retry is possible.
    fn request_retry(&self) -> Option<RetrySignal>;

    /// Idempotent. Stops an in-flight `execute` and abandons any pending retry.
    fn cancel(&self);
}
