//! Retry and backoff policy.
//!
//! Classifies execution failures (non-zero exit, deadline, spawn, storage) and
//! decides whether a failed job gets another attempt and after what delay.
//! Download jobs consult the policy after each execution; the engine only
//! sees the resulting retry signal.

mod classify;
mod error;
mod policy;

pub use classify::{classify, classify_command_error};
pub use error::ExecutionFailure;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
