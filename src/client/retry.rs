//! Capped exponential backoff for transient protocol failures.
//!
//! # Schedule
//!
//! With the defaults (base 1s, factor 2, cap 30s, 5 attempts) the delays
//! between attempts are 1s, 2s, 4s, 8s. The attempt that exhausts the budget
//! is not followed by a delay.

use crate::{Error, Result};
use std::time::Duration;

/// Outcome of a failed attempt.
#[derive(Debug)]
pub enum FailureAction {
    /// Transient failure; the cause is kept for the final diagnostic.
    Retry(String),
    /// Permanent failure; returned to the caller immediately.
    Fail(Error),
}

/// Retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` attempts and no delay in between.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(20);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `attempt` until it succeeds, fails permanently, or the budget is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns the permanent error unchanged, or
    /// [`Error::TransferFailed`] carrying the last transient cause.
    pub fn run<T, F>(&self, operation: &'static str, stream: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> std::result::Result<T, FailureAction>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_cause = String::new();

        for n in 1..=max_attempts {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(FailureAction::Fail(err)) => return Err(err),
                Err(FailureAction::Retry(cause)) => {
                    if n < max_attempts {
                        let delay = self.delay_for_attempt(n);
                        metrics::counter!(
                            "eventshuttle_http_retries_total",
                            "operation" => operation
                        )
                        .increment(1);
                        tracing::warn!(
                            operation,
                            stream,
                            attempt = n,
                            max_attempts,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            cause = %cause,
                            "Transient failure, retrying"
                        );
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                    last_cause = cause;
                },
            }
        }

        Err(Error::TransferFailed {
            stream: stream.to_string(),
            operation: operation.to_string(),
            attempts: max_attempts,
            cause: last_cause,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(30));
    }

    #[test]
    fn test_recovers_after_transient_failures() {
        let mut calls = 0;
        let value = RetryPolicy::immediate(5)
            .run("read_page", "orders", || {
                calls += 1;
                if calls < 3 {
                    Err(FailureAction::Retry("HTTP 503".to_string()))
                } else {
                    Ok(calls)
                }
            })
            .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn test_exhaustion_reports_last_cause() {
        let mut calls = 0u32;
        let err = RetryPolicy::immediate(3)
            .run::<(), _>("append", "orders", || {
                calls += 1;
                Err(FailureAction::Retry(format!("HTTP 50{calls}")))
            })
            .unwrap_err();

        assert_eq!(calls, 3);
        match err {
            Error::TransferFailed {
                attempts,
                cause,
                operation,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(cause, "HTTP 503");
                assert_eq!(operation, "append");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let mut calls = 0;
        let err = RetryPolicy::immediate(5)
            .run::<(), _>("append", "orders", || {
                calls += 1;
                Err(FailureAction::Fail(Error::StreamNotFound {
                    stream: "orders".to_string(),
                }))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, Error::StreamNotFound { .. }));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let mut calls = 0;
        let _ = RetryPolicy::immediate(0).run::<(), _>("read_page", "s", || {
            calls += 1;
            Err(FailureAction::Retry("x".to_string()))
        });
        assert_eq!(calls, 1);
    }
}
