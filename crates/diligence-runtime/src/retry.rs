//! Retry logic with exponential backoff
//!
//! Shared by the bounded executor (per unit of work) and the orchestrator
//! (optional per-agent retry). Only errors that report themselves as
//! retryable (timeouts, external call failures) are attempted again.

use diligence_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier (typically 2.0 for exponential backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    /// One attempt plus two retries
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Configuration(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::Configuration(format!(
                "backoff multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Backoff before the given attempt (attempt 0 never waits)
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let backoff = Duration::from_millis(backoff_ms as u64);
        backoff.min(self.max_backoff)
    }

    /// Execute an async operation with retry logic
    ///
    /// Returns the result of the last attempt.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_counted(operation_name, operation).await.0
    }

    /// Like [`execute`](Self::execute), also reporting how many attempts ran
    pub async fn execute_counted<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(operation = operation_name, attempt, max_attempts, "attempt");

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(
                            operation = operation_name,
                            retries = attempt - 1,
                            "succeeded after retry"
                        );
                    }
                    return (Ok(result), attempt);
                }
                Err(e) if !e.is_retryable() => {
                    debug!(operation = operation_name, error = %e, "non-retryable error");
                    return (Err(e), attempt);
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "all attempts failed"
                    );
                    return (Err(e), attempt);
                }
                Err(e) => {
                    let backoff = self.backoff_duration(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        error = %e,
                        ?backoff,
                        "attempt failed, retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
        assert_eq!(policy.max_backoff, Duration::from_secs(10));
        tokio_test::assert_ok!(policy.validate());
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff_duration(0), Duration::ZERO);
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_duration(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_duration(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff_duration(10), Duration::from_secs(10));
    }

    #[test]
    fn test_validation() {
        let zero = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        tokio_test::assert_err!(zero.validate());

        let shrinking = RetryPolicy {
            backoff_multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert!(shrinking.validate().is_err());
    }

    #[tokio::test]
    async fn test_success_after_retry() {
        let policy = RetryPolicy::fast();
        let calls = Arc::new(AtomicU32::new(0));

        let (result, attempts) = policy
            .execute_counted("flaky", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Error::ExternalCall("connection reset".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_all_attempts_fail() {
        let policy = RetryPolicy::fast();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<()> = policy
            .execute("down", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::timeout("down", Duration::from_millis(5)))
                }
            })
            .await;

        assert!(result.unwrap_err().is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let policy = RetryPolicy::fast();
        let calls = Arc::new(AtomicU32::new(0));

        let (result, attempts) = policy
            .execute_counted("bad-config", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(Error::Configuration("missing key".into()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
