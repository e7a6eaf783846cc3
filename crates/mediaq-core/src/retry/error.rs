//! Execution failure type for retry classification.

use crate::command::CommandError;

/// Why a single execution of a download job failed.
/// Kept separate from API errors: failures are handled inside the engine and
/// only ever surface to callers as progress codes.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionFailure {
    /// The external command failed, timed out, or was cancelled.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The command succeeded but its output could not be moved into place.
    #[error("finalize output: {0}")]
    Storage(#[source] std::io::Error),
}

impl ExecutionFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionFailure::Command(CommandError::Cancelled { .. }))
    }
}
