//! Execution controls for provider calls: per-attempt timeout and retry
//! with exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::obs;
use crate::provision::{ProviderFailure, ProvisionError, ProvisionResult};

/// Timeout and retry budget for a single provider operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum wall-clock time for a single attempt (milliseconds).
    pub timeout_ms: u64,
    /// Maximum number of retries (0 = no retries, run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// A policy that runs once with the given timeout.
    pub fn no_retry(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            max_retries: 0,
            backoff_base_ms: 0,
        }
    }

    /// Delay before attempt `attempt + 1`, for `attempt >= 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Run `call` under `policy`.
///
/// Only retryable failures are retried. An attempt that exceeds the
/// timeout becomes `ProviderFailure::Timeout` in the failure domain built
/// by `timeout_error`, and is retried like any other transient failure.
pub async fn with_retry<T, F, Fut, E>(
    policy: &RetryPolicy,
    operation: &str,
    call: F,
    timeout_error: E,
) -> ProvisionResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ProvisionResult<T>>,
    E: Fn(ProviderFailure) -> ProvisionError,
{
    let max_attempts = policy.max_retries + 1;
    let timeout = Duration::from_millis(policy.timeout_ms);
    let mut attempt = 1;

    loop {
        let err = match tokio::time::timeout(timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_elapsed) => timeout_error(ProviderFailure::Timeout {
                limit_ms: policy.timeout_ms,
            }),
        };

        if attempt >= max_attempts || !err.is_retryable() {
            return Err(err);
        }

        let delay = policy.backoff(attempt);
        obs::emit_provision_retry(operation, attempt, delay, &err);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn provision_error(cause: ProviderFailure) -> ProvisionError {
        ProvisionError::Provision {
            repo: "r".into(),
            cause,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.timeout_ms, 30_000);
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.backoff_base_ms, 500);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let result = with_retry(
            &RetryPolicy::default(),
            "create_repository",
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(provision_error(ProviderFailure::Network("reset".into())))
                } else {
                    Ok(7)
                }
            },
            provision_error,
        )
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_retry_permanent() {
        let calls = &AtomicU32::new(0);
        let result: ProvisionResult<()> = with_retry(
            &RetryPolicy::default(),
            "create_repository",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(provision_error(ProviderFailure::Unauthorized))
            },
            provision_error,
        )
        .await;

        assert_eq!(
            result.unwrap_err().cause(),
            &ProviderFailure::Unauthorized
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let calls = &AtomicU32::new(0);
        let result: ProvisionResult<()> = with_retry(
            &RetryPolicy::default(),
            "commit_file",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(provision_error(ProviderFailure::QuotaExceeded))
            },
            provision_error,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_operation_domain() {
        let policy = RetryPolicy {
            timeout_ms: 100,
            max_retries: 1,
            backoff_base_ms: 10,
        };
        let result: ProvisionResult<()> = with_retry(
            &policy,
            "commit_file",
            || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            |cause| ProvisionError::Commit {
                repo: "r".into(),
                path: "a.py".into(),
                cause,
            },
        )
        .await;

        assert_eq!(
            result,
            Err(ProvisionError::Commit {
                repo: "r".into(),
                path: "a.py".into(),
                cause: ProviderFailure::Timeout { limit_ms: 100 },
            })
        );
    }
}
