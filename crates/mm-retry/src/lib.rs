// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Shared exponential-backoff policy and retry driver, used by the queue
//! consumer (C7, §4.7 `handle_failure`) and the mock-server client (C8,
//! §4.8 "Retry policy") so both retry loops share one implementation
//! instead of duplicating the backoff formula.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// `delay(n) = min(base * 2^n, ceiling)`.
///
/// §4.7 pins this exactly as `min(2^retry_count, 60)` seconds for the queue
/// consumer ([`Self::queue_default`]); §4.8 calls for "exponential backoff
/// up to a small fixed ceiling (e.g. 3 attempts, 1-10 s)" for the
/// mock-server client ([`Self::mock_client_default`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    base: Duration,
    ceiling: Duration,
}

impl ExponentialBackoff {
    /// Builds a policy with the given base delay and ceiling.
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self { base, ceiling }
    }

    /// The queue consumer's retry/backoff policy (§4.7): `min(2^n, 60)` seconds.
    pub fn queue_default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }

    /// The mock-server client's retry/backoff policy (§4.8): 1-10 second ceiling.
    pub fn mock_client_default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(10))
    }

    /// The delay before the `attempt`-th retry (0-indexed: `attempt = 0` is
    /// the delay before the first retry after the initial failure).
    pub fn delay(&self, attempt: u32) -> Duration {
        let scaled = self.base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        scaled.min(self.ceiling)
    }

    /// Sleeps for [`Self::delay`] of `attempt`.
    pub async fn wait(&self, attempt: u32) {
        tokio::time::sleep(self.delay(attempt)).await;
    }
}

/// The outcome an operation reports to [`retry`], distinguishing retryable
/// failures (§7 `APPLY_TRANSIENT`, `QUEUE_ENQUEUE_ERROR`) from permanent
/// ones (§7 `APPLY_PERMANENT`) that must not be retried at all.
pub enum Outcome<T> {
    /// The operation succeeded.
    Success(T),
    /// The operation failed but may succeed on a later attempt.
    Retryable(String),
    /// The operation failed in a way retrying cannot fix (e.g. a 4xx).
    Permanent(String),
}

/// Errors surfaced once a retry loop gives up.
#[derive(Debug, Error)]
pub enum RetryError {
    /// Every attempt failed with a retryable error; the last one is attached.
    #[error("exhausted {attempts} attempt(s), last error: {last_error}")]
    Exhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The error message from the final attempt.
        last_error: String,
    },
    /// The operation reported a permanent failure; no further attempts were made.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

/// Drives `op` up to `max_attempts` times, sleeping for `policy`'s backoff
/// between attempts, stopping immediately on [`Outcome::Permanent`].
///
/// `op` is called with the zero-based attempt number so it can tag logs or
/// context with it.
pub async fn retry<T, F, Fut>(policy: &ExponentialBackoff, max_attempts: u32, mut op: F) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    let mut last_error = String::new();
    for attempt in 0..max_attempts.max(1) {
        match op(attempt).await {
            Outcome::Success(value) => return Ok(value),
            Outcome::Permanent(reason) => return Err(RetryError::Permanent(reason)),
            Outcome::Retryable(reason) => {
                last_error = reason;
                if attempt + 1 < max_attempts {
                    debug!(attempt, delay_ms = policy.delay(attempt).as_millis() as u64, "retrying after transient failure");
                    policy.wait(attempt).await;
                }
            }
        }
    }
    Err(RetryError::Exhausted {
        attempts: max_attempts.max(1),
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn queue_default_matches_min_2_pow_n_capped_at_60() {
        let policy = ExponentialBackoff::queue_default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(6), Duration::from_secs(60));
        assert_eq!(policy.delay(10), Duration::from_secs(60));
    }

    #[test]
    fn mock_client_default_caps_at_ten_seconds() {
        let policy = ExponentialBackoff::mock_client_default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(5), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_attempt() {
        let policy = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(1));
        let result = retry(&policy, 3, |_| async { Outcome::<i32>::Success(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let policy = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result = retry(&policy, 3, |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Outcome::Retryable("not yet".to_string())
                } else {
                    Outcome::Success(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let policy = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(1));
        let result: Result<(), RetryError> = retry(&policy, 3, |_| async { Outcome::Retryable("down".to_string()) }).await;
        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            _ => panic!("expected Exhausted"),
        }
    }

    #[tokio::test]
    async fn permanent_failure_stops_immediately() {
        let policy = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError> = retry(&policy, 5, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Outcome::Permanent("400 bad request".to_string()) }
        })
        .await;
        assert!(matches!(result, Err(RetryError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
