//! Exponential backoff around fallible provider calls.

use std::future::Future;
use std::time::Duration;

use sitcom_config::RetryConfig;
use tracing::warn;

use crate::error::{LlmError, LlmResult};

/// How many times a call is attempted and how long to wait in between.
///
/// The wait before attempt `n + 1` is `base_delay * 2^(n - 1)`, so the
/// default policy sleeps 1 s, then 2 s.  No sleep follows the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    /// Delay slept after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Run `operation` until it succeeds, a non-transient error occurs, or the
/// policy's attempts are used up.
///
/// Non-transient errors are returned as-is on the attempt that raised them.
/// Running out of attempts yields [`LlmError::ExhaustedRetries`] wrapping the
/// last failure.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> LlmResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LlmResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if attempt >= max_attempts => {
                warn!(attempt, operation = label, %err, "giving up");
                return Err(LlmError::ExhaustedRetries {
                    operation: label.to_string(),
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                warn!(attempt, operation = label, %err, ?delay, "call failed; retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn empty() -> LlmError {
        LlmError::EmptyResponse {
            provider: "scripted".into(),
        }
    }

    #[test]
    fn delays_double_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn from_config_never_allows_zero_attempts() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 0,
            base_delay_ms: 10,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_two_sleeps() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_with_backoff(&RetryPolicy::default(), "outline", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(empty())
                } else {
                    Ok("Scene 1: \"Pilot\"".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "Scene 1: \"Pilot\"");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1 s + 2 s; a third sleep would push this to 7 s.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_three_attempts_without_trailing_sleep() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: LlmResult<String> =
            retry_with_backoff(&RetryPolicy::default(), "character analysis", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(empty()) }
            })
            .await;

        match result {
            Err(LlmError::ExhaustedRetries {
                operation,
                attempts,
                last,
            }) => {
                assert_eq!(operation, "character analysis");
                assert_eq!(attempts, 3);
                assert!(matches!(*last, LlmError::EmptyResponse { .. }));
            }
            other => panic!("expected ExhaustedRetries, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: LlmResult<String> =
            retry_with_backoff(&RetryPolicy::default(), "pitch", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LlmError::Configuration("OPENAI_API_KEY is not set".into())) }
            })
            .await;

        assert!(matches!(result, Err(LlmError::Configuration(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
