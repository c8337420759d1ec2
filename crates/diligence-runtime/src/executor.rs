//! Bounded parallel executor
//!
//! Runs independent async units of work with at most `max_concurrency` in
//! flight. Every unit gets a per-attempt timeout and a bounded retry. A
//! failing unit never aborts its siblings: the batch always reports one
//! outcome per submitted unit, in submission order. A panicking unit is
//! caught and reported as a processing failure.

use crate::retry::RetryPolicy;
use diligence_core::{Error, Result};
use futures::FutureExt;
use futures::future::join_all;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::num::NonZeroU32;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum units running at once
    pub max_concurrency: usize,
    /// Time allowed for a single attempt of a unit
    pub unit_timeout: Duration,
    pub retry: RetryPolicy,
    /// Optional cap on attempts started per second, across all units
    pub rate_limit_per_second: Option<NonZeroU32>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            unit_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            rate_limit_per_second: None,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::Configuration(
                "executor concurrency must be at least 1".to_string(),
            ));
        }
        if self.unit_timeout.is_zero() {
            return Err(Error::Configuration(
                "unit timeout must be greater than zero".to_string(),
            ));
        }
        self.retry.validate()
    }
}

/// Outcome of one submitted unit
#[derive(Debug)]
pub struct UnitOutcome<T> {
    /// Position in the submitted list
    pub index: usize,
    pub attempts: u32,
    pub result: Result<T>,
}

impl<T> UnitOutcome<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_timeout(&self) -> bool {
        self.result.as_ref().is_err_and(Error::is_timeout)
    }
}

/// All outcomes of one batch, aligned with submission order
#[derive(Debug)]
pub struct BatchReport<T> {
    outcomes: Vec<UnitOutcome<T>>,
}

impl<T> BatchReport<T> {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn timed_out(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_timeout()).count()
    }

    pub fn outcomes(&self) -> &[UnitOutcome<T>] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<UnitOutcome<T>> {
        self.outcomes
    }
}

/// Fan-out/fan-in under a counting semaphore
#[derive(Clone)]
pub struct BoundedExecutor {
    config: ExecutorConfig,
    semaphore: Arc<Semaphore>,
    rate_limiter: Option<SharedRateLimiter>,
}

impl std::fmt::Debug for BoundedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedExecutor")
            .field("config", &self.config)
            .field("available_permits", &self.semaphore.available_permits())
            .finish_non_exhaustive()
    }
}

impl BoundedExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        config.validate()?;
        let rate_limiter = config
            .rate_limit_per_second
            .map(|per_second| Arc::new(RateLimiter::direct(Quota::per_second(per_second))));
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            rate_limiter,
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every unit and report every outcome
    ///
    /// `label` names the batch in logs. Units are factories so that a retry
    /// can start a fresh attempt; they must not depend on each other.
    pub async fn run_all<F, Fut, T>(&self, label: &str, units: Vec<F>) -> BatchReport<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let submitted = units.len();
        debug!(
            batch = label,
            units = submitted,
            limit = self.config.max_concurrency,
            "dispatching batch"
        );

        let outcomes = join_all(
            units
                .iter()
                .enumerate()
                .map(|(index, unit)| self.run_unit(label, index, unit)),
        )
        .await;

        let report = BatchReport { outcomes };
        info!(
            batch = label,
            units = submitted,
            succeeded = report.succeeded(),
            failed = report.failed(),
            timed_out = report.timed_out(),
            "batch complete"
        );
        report
    }

    /// Run a single unit with the same timeout and retry wrapping
    pub async fn run_one<F, Fut, T>(&self, label: &str, unit: F) -> UnitOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_unit(label, 0, &unit).await
    }

    async fn run_unit<F, Fut, T>(&self, label: &str, index: usize, unit: &F) -> UnitOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let name = format!("{label}[{index}]");
        let semaphore = &self.semaphore;
        let limiter = self.rate_limiter.as_ref();
        let unit_timeout = self.config.unit_timeout;
        let operation = name.as_str();

        let (result, attempts) = self
            .config
            .retry
            .execute_counted(operation, move || async move {
                // Permit is held for one attempt only, never across backoff
                let Ok(_permit) = semaphore.acquire().await else {
                    return Err(Error::Processing("executor semaphore closed".to_string()));
                };
                if let Some(limiter) = limiter {
                    limiter.until_ready().await;
                }
                let attempt = AssertUnwindSafe(async { unit().await }).catch_unwind();
                match timeout(unit_timeout, attempt).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(payload)) => Err(Error::from_panic(operation, payload.as_ref())),
                    Err(_) => Err(Error::timeout(operation, unit_timeout)),
                }
            })
            .await;

        if let Err(e) = &result {
            warn!(unit = %name, attempts, error = %e, "unit failed");
        }

        UnitOutcome {
            index,
            attempts,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    fn executor(
        max_concurrency: usize,
        unit_timeout: Duration,
        retry: RetryPolicy,
    ) -> BoundedExecutor {
        BoundedExecutor::new(ExecutorConfig {
            max_concurrency,
            unit_timeout,
            retry,
            rate_limit_per_second: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_partial_failure_isolated() {
        let exec = executor(3, Duration::from_secs(1), RetryPolicy::no_retry());
        let units: Vec<_> = (0..6usize)
            .map(|i| {
                move || async move {
                    if i == 3 {
                        Err(Error::ExternalCall("unit 3 exploded".into()))
                    } else {
                        Ok(i * 10)
                    }
                }
            })
            .collect();

        let report = exec.run_all("isolation", units).await;

        assert_eq!(report.len(), 6);
        assert_eq!(report.succeeded(), 5);
        assert_eq!(report.failed(), 1);
        for (position, outcome) in report.outcomes().iter().enumerate() {
            assert_eq!(outcome.index, position);
            if position == 3 {
                assert!(outcome.result.is_err());
            } else {
                assert_eq!(*outcome.result.as_ref().unwrap(), position * 10);
            }
        }
    }

    #[tokio::test]
    async fn test_panicking_unit_isolated() {
        let exec = executor(2, Duration::from_secs(1), RetryPolicy::fast());
        let units: Vec<_> = (0..3usize)
            .map(|i| {
                move || async move {
                    let sizes: Vec<usize> = Vec::new();
                    if i == 1 {
                        return Ok(sizes[i]);
                    }
                    Ok(i + 100)
                }
            })
            .collect();

        let report = exec.run_all("panicky", units).await;

        assert_eq!(report.len(), 3);
        assert_eq!(report.succeeded(), 2);
        let outcomes = report.outcomes();
        assert_eq!(*outcomes[0].result.as_ref().unwrap(), 100);
        assert_eq!(*outcomes[2].result.as_ref().unwrap(), 102);

        let failed = &outcomes[1];
        assert_eq!(failed.index, 1);
        // Processing errors are not retried
        assert_eq!(failed.attempts, 1);
        let err = failed.result.as_ref().unwrap_err();
        assert!(matches!(err, Error::Processing(_)));
        assert!(err.to_string().contains("panicky[1] panicked"));
    }

    #[tokio::test]
    async fn test_concurrency_cap() {
        let exec = executor(2, Duration::from_secs(1), RetryPolicy::no_retry());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let units: Vec<_> = (0..8)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                move || {
                    let running = Arc::clone(&running);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(15)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                }
            })
            .collect();

        let report = exec.run_all("cap", units).await;
        assert_eq!(report.succeeded(), 8);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_then_retry() {
        let exec = executor(4, Duration::from_millis(20), RetryPolicy::fast());
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = exec
            .run_one("slow-then-fast", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    Ok("done")
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), "done");
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_timeout_exhausts_retries() {
        let exec = executor(4, Duration::from_millis(10), RetryPolicy::fast());

        let units = vec![|| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }];
        let report = exec.run_all("hung", units).await;

        assert_eq!(report.timed_out(), 1);
        assert_eq!(report.outcomes()[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_not_retried() {
        let exec = executor(1, Duration::from_secs(1), RetryPolicy::fast());
        let calls = AtomicU32::new(0);

        let outcome = exec
            .run_one("bad", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Processing("malformed".into()))
            })
            .await;

        assert!(!outcome.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_batch_completes() {
        let exec = BoundedExecutor::new(ExecutorConfig {
            rate_limit_per_second: NonZeroU32::new(100),
            ..ExecutorConfig::default()
        })
        .unwrap();
        let units: Vec<_> = (0..3).map(|i| move || async move { Ok(i) }).collect();

        let report = exec.run_all("limited", units).await;
        assert_eq!(report.succeeded(), 3);
    }

    #[test]
    fn test_config_validation() {
        assert!(ExecutorConfig::default().validate().is_ok());
        let zero = ExecutorConfig {
            max_concurrency: 0,
            ..ExecutorConfig::default()
        };
        assert!(BoundedExecutor::new(zero).is_err());
    }
}
