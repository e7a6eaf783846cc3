//! Classify command and storage failures into retry policy error kinds.

use crate::command::CommandError;
use crate::retry::error::ExecutionFailure;
use crate::retry::policy::ErrorKind;

/// Classify a command error. Returns `None` for cancellation, which is never retried
/// and never judged by the policy.
pub fn classify_command_error(e: &CommandError) -> Option<ErrorKind> {
    match e {
        CommandError::Spawn { .. } => Some(ErrorKind::Spawn),
        CommandError::Exit { .. } | CommandError::Wait { .. } => Some(ErrorKind::Exit),
        CommandError::Timeout { .. } => Some(ErrorKind::Timeout),
        CommandError::Cancelled { .. } => None,
    }
}

/// Classify an execution failure (command or storage) into an ErrorKind.
pub fn classify(e: &ExecutionFailure) -> Option<ErrorKind> {
    match e {
        ExecutionFailure::Command(ce) => classify_command_error(ce),
        ExecutionFailure::Storage(_) => Some(ErrorKind::Storage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn spawn_failure_is_its_own_kind() {
        let e = CommandError::Spawn {
            program: "yt-dlp".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(classify_command_error(&e), Some(ErrorKind::Spawn));
    }

    #[test]
    fn timeout_and_cancel() {
        let t = CommandError::Timeout {
            program: "yt-dlp".into(),
            limit: Duration::from_secs(1),
        };
        assert_eq!(classify_command_error(&t), Some(ErrorKind::Timeout));
        let c = ExecutionFailure::Command(CommandError::Cancelled {
            program: "yt-dlp".into(),
        });
        assert!(c.is_cancelled());
        assert_eq!(classify(&c), None);
    }

    #[test]
    fn storage_failure_is_retryable_kind() {
        let e = ExecutionFailure::Storage(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(classify(&e), Some(ErrorKind::Storage));
    }
}
