//! Retry decisions with capped exponential backoff.
//!
//! The client never loops on its own; it surfaces classified errors and
//! callers compose this policy around the operations they care about.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::defaults;
use crate::error::{ErrorKind, FarcasterError, Result};

/// Retry policy. Pure: holds no mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,
}

fn default_max_attempts() -> u32 {
    defaults::RETRY_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    defaults::RETRY_BASE_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    defaults::RETRY_MAX_DELAY_MS
}

fn default_exponential_base() -> f64 {
    defaults::RETRY_EXPONENTIAL_BASE
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            exponential_base: defaults::RETRY_EXPONENTIAL_BASE,
        }
    }
}

impl RetryPolicy {
    /// Policy that makes a single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether another attempt may follow an error of `kind`, given that
    /// `attempts_made` calls have already run. `max_attempts` bounds the
    /// total number of calls.
    pub fn should_retry(&self, attempts_made: u32, kind: ErrorKind) -> bool {
        if attempts_made >= self.max_attempts {
            return false;
        }
        matches!(kind, ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Http)
    }

    /// Like [`should_retry`](Self::should_retry) but also applies the
    /// status-class rule for HTTP errors.
    pub fn should_retry_error(&self, attempts_made: u32, err: &FarcasterError) -> bool {
        self.should_retry(attempts_made, err.kind()) && err.is_retryable()
    }

    /// `base * exponential_base^attempt`, clamped to `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.base_delay_ms as f64 * self.exponential_base.powi(exponent);
        if !delay_ms.is_finite() || delay_ms >= self.max_delay_ms as f64 {
            return Duration::from_millis(self.max_delay_ms);
        }
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Run `op` until it succeeds or the policy gives up, sleeping the
    /// calling thread between attempts. `op` receives the zero-based attempt
    /// index; at most `max_attempts` calls are made.
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry_error(attempt + 1, &err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {}ms",
                        operation,
                        attempt + 1,
                        self.max_attempts,
                        err,
                        delay.as_millis()
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 0 {
                        error!("{} failed after {} attempts: {}", operation, attempt + 1, err);
                    } else {
                        info!("{} failed with non-retryable error: {}", operation, err);
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            exponential_base: 2.0,
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(RetryPolicy::default(), policy());
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let policy = policy();
        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous, "attempt {attempt} went backwards");
            assert!(delay <= Duration::from_millis(5000));
            previous = delay;
        }
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn test_retry_gating() {
        let policy = policy();
        for kind in [ErrorKind::Network, ErrorKind::Timeout, ErrorKind::Signing] {
            assert!(!policy.should_retry(3, kind));
            assert!(!policy.should_retry(7, kind));
        }
        assert!(!policy.should_retry(0, ErrorKind::Signing));
        assert!(!policy.should_retry(1, ErrorKind::InvalidMessage));
        assert!(!policy.should_retry(1, ErrorKind::JsonParse));
        assert!(policy.should_retry(0, ErrorKind::Timeout));
        assert!(policy.should_retry(2, ErrorKind::Network));
        assert!(policy.should_retry(1, ErrorKind::Http));
    }

    #[test]
    fn test_should_retry_error_checks_status_class() {
        let policy = policy();
        assert!(policy.should_retry_error(0, &FarcasterError::http(502, "bad gateway")));
        assert!(!policy.should_retry_error(0, &FarcasterError::http(400, "bad request")));
    }

    #[test]
    fn test_run_retries_transient_failures() {
        let policy = RetryPolicy {
            base_delay_ms: 1,
            max_delay_ms: 2,
            ..policy()
        };
        let mut calls = 0;
        let result = policy.run("flaky", |attempt| {
            calls += 1;
            if attempt < 2 {
                Err(FarcasterError::Timeout)
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_run_stops_on_fatal_error() {
        let mut calls = 0;
        let result: Result<()> = policy().run("sign", |_| {
            calls += 1;
            Err(FarcasterError::signing("bad key"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_run_gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 1,
            exponential_base: 2.0,
        };
        let mut calls = 0;
        let result: Result<()> = policy.run("down", |_| {
            calls += 1;
            Err(FarcasterError::http(503, "unavailable"))
        });
        assert!(matches!(result, Err(FarcasterError::Http { status: 503, .. })));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_max_attempts_bounds_total_calls() {
        let policy = RetryPolicy {
            base_delay_ms: 1,
            max_delay_ms: 1,
            ..policy()
        };
        let mut calls = 0;
        let result: Result<()> = policy.run("timeout", |_| {
            calls += 1;
            Err(FarcasterError::Timeout)
        });
        assert!(matches!(result, Err(FarcasterError::Timeout)));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_none_never_retries() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry(1, ErrorKind::Timeout));

        let mut calls = 0;
        let result: Result<()> = policy.run("once", |_| {
            calls += 1;
            Err(FarcasterError::Timeout)
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
