//! Retry with exponential backoff for rate-limited API calls.
//!
//! Only the upstream rate-limit signal (HTTP 429) is retried. Every other
//! failure is returned to the caller on the first attempt.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::sources::SourceError;

/// Bounded retry policy with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_retries: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Factor applied to the delay after every rate-limited attempt
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2,
        }
    }
}

/// Per-invocation retry bookkeeping
#[derive(Debug)]
struct RetryState {
    attempt: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy with the default multiplier
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            ..Self::default()
        }
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `operation`, retrying while it fails with a rate-limit error.
    ///
    /// The state starts fresh on every call. After `max_retries` rate-limited
    /// attempts the last error is wrapped in [`SourceError::RetryExhausted`].
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let max_attempts = self.max_retries.max(1);
        let mut state = RetryState {
            attempt: 0,
            backoff: self.initial_backoff,
        };

        loop {
            state.attempt += 1;

            match operation().await {
                Ok(result) => {
                    if state.attempt > 1 {
                        tracing::info!(
                            "Request succeeded on attempt {} after {} rate-limited attempts",
                            state.attempt,
                            state.attempt - 1
                        );
                    }
                    return Ok(result);
                }
                Err(error) if error.is_rate_limited() => {
                    if state.attempt >= max_attempts {
                        tracing::warn!(
                            "Giving up after {} rate-limited attempts: {}",
                            state.attempt,
                            error
                        );
                        return Err(SourceError::RetryExhausted {
                            attempts: state.attempt,
                            last: Box::new(error),
                        });
                    }

                    tracing::debug!(
                        "Rate limited on attempt {}/{}, retrying in {:?}",
                        state.attempt,
                        max_attempts,
                        state.backoff
                    );

                    sleep(state.backoff).await;
                    state.backoff *= self.backoff_multiplier;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn rate_limited() -> SourceError {
        SourceError::Http {
            status: 429,
            message: "Too Many Requests".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = RetryPolicy::default()
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, SourceError>("ok")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_between_rate_limited_attempts() {
        let start = Instant::now();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let result = RetryPolicy::default()
            .execute(|| {
                let seen = Arc::clone(&seen);
                async move {
                    let attempt = {
                        let mut seen = seen.lock().unwrap();
                        seen.push(start.elapsed());
                        seen.len()
                    };
                    if attempt < 3 {
                        Err(rate_limited())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        let first_gap = seen[1] - seen[0];
        let second_gap = seen[2] - seen[1];
        assert!(first_gap >= Duration::from_secs(1));
        assert!(second_gap >= Duration::from_secs(2));
        assert!(second_gap > first_gap);
        assert!(seen[2] < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_fail_without_sleeping() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result: Result<(), _> = RetryPolicy::default()
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SourceError::Http {
                        status: 500,
                        message: "boom".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(SourceError::Http { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = RetryPolicy::default()
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(rate_limited())
                }
            })
            .await;

        match result {
            Err(SourceError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.is_rate_limited());
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_resets_between_calls() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));

        for _ in 0..2 {
            let start = Instant::now();
            let calls = Arc::new(AtomicU32::new(0));
            let result = policy
                .execute(|| {
                    let calls = Arc::clone(&calls);
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(rate_limited())
                        } else {
                            Ok(())
                        }
                    }
                })
                .await;

            assert!(result.is_ok());
            let waited = start.elapsed();
            assert!(waited >= Duration::from_millis(100));
            assert!(waited < Duration::from_millis(200));
        }
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let result: Result<(), _> = RetryPolicy::no_retry()
            .execute(|| async { Err(rate_limited()) })
            .await;

        assert!(matches!(
            result,
            Err(SourceError::RetryExhausted { attempts: 1, .. })
        ));
    }
}
