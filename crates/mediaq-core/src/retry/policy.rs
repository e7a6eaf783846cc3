use std::time::Duration;

/// High-level classification of a failed execution for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Command ran and exited unsuccessfully (non-zero status or killed by a signal).
    Exit,
    /// Per-execution deadline elapsed before the command finished.
    Timeout,
    /// Command could not be started (missing tool, permissions). Not retried.
    Spawn,
    /// Command succeeded but its output could not be finalized.
    Storage,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry; the failure is terminal.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with caps.
///
/// `RetryPolicy::fixed` sets `max_delay == base_delay`, which yields a constant
/// delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first). 0 is treated as 1.
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// Constant `delay` between attempts, at most `max_attempts` executions.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
        }
    }

    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether attempt number `attempt` (1-based) is the last one allowed.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts()
    }

    /// Backoff before attempt `attempt + 1`: base * 2^(attempt-1), capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(8);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }

    /// Decide what to do after attempt `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if self.is_exhausted(attempt) {
            return RetryDecision::NoRetry;
        }

        match kind {
            ErrorKind::Spawn => RetryDecision::NoRetry,
            ErrorKind::Exit | ErrorKind::Timeout | ErrorKind::Storage => {
                RetryDecision::RetryAfter(self.delay_after(attempt))
            }
        }
    }
}
