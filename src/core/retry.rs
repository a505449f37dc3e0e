use crate::config::RetryConfig;
use crate::utils::error::{Result, SyncError};
use std::future::Future;
use std::time::Duration;

/// Outcome of a single attempt inside [`RetryPolicy::run`].
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// Not finished yet (report still running, transient network failure).
    Pending(String),
    /// Fatal; returned to the caller without further attempts.
    Failed(SyncError),
}

/// Bounded exponential backoff. No jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_factor,
            max_delay: None,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: secs_to_duration(config.initial_delay_secs),
            backoff_factor: config.backoff_factor,
            max_delay: config.max_delay_secs.map(secs_to_duration),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let next = Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(ceiling) if next > ceiling => ceiling,
            _ => next,
        }
    }

    /// Runs `op` until it yields `Done` or `Failed`, sleeping between
    /// `Pending` attempts. At most `max_retries + 1` attempts are made.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let attempts = self.max_retries.saturating_add(1);
        let mut delay = match self.max_delay {
            Some(ceiling) if self.initial_delay > ceiling => ceiling,
            _ => self.initial_delay,
        };

        let mut attempt = 1;
        loop {
            match op().await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Failed(e) => return Err(e),
                Attempt::Pending(reason) if attempt < attempts => {
                    tracing::warn!(
                        "Attempt {}/{} failed for {}: {}. Retrying in {:.2} seconds...",
                        attempt,
                        attempts,
                        operation,
                        reason,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                    attempt += 1;
                }
                Attempt::Pending(reason) => {
                    tracing::error!(
                        "All {} attempts failed for {}. Last error: {}",
                        attempts,
                        operation,
                        reason
                    );
                    return Err(SyncError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts,
                        last_error: reason,
                    });
                }
            }
        }
    }
}

/// Seconds to a `Duration` without panicking: negative or NaN input is zero,
/// anything too large saturates at `Duration::MAX`.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), 2.0)
    }

    #[tokio::test]
    async fn test_returns_first_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = fast_policy(3)
            .run("op", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Attempt::Done(42)
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_pending_until_done() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = fast_policy(5)
            .run("poll", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Attempt::Pending("REPORT RUNNING".to_string())
                } else {
                    Attempt::Done(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_reason() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = fast_policy(2)
            .run("poll", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Attempt::<()>::Pending(format!("still running #{}", n))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            SyncError::RetriesExhausted {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "still running #3");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = fast_policy(5)
            .run("trigger", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Attempt::<()>::Failed(SyncError::ReportTimedOut)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::ReportTimedOut));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_growth_and_ceiling() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 2.0);
        assert_eq!(policy.next_delay(Duration::from_secs(4)), Duration::from_secs(8));

        let capped = policy.with_max_delay(Some(Duration::from_secs(5)));
        assert_eq!(capped.next_delay(Duration::from_secs(4)), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_backoff_saturates() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 1e300);
        assert_eq!(policy.next_delay(Duration::from_secs(60)), Duration::MAX);

        let capped = policy.with_max_delay(Some(Duration::from_secs(30)));
        assert_eq!(capped.next_delay(Duration::from_secs(60)), Duration::from_secs(30));
    }

    #[test]
    fn test_from_config_with_out_of_range_seconds() {
        let config = RetryConfig {
            initial_delay_secs: 1e30,
            max_delay_secs: Some(f64::NAN),
            ..RetryConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.initial_delay, Duration::MAX);
        assert_eq!(policy.max_delay, Some(Duration::ZERO));

        assert_eq!(secs_to_duration(-1.0), Duration::ZERO);
        assert_eq!(secs_to_duration(1.5), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_huge_backoff_exhausts_without_panic() {
        let err = RetryPolicy::new(1, Duration::from_millis(1), 1e300)
            .run("poll", || async { Attempt::<()>::Pending("running".to_string()) })
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::RetriesExhausted { attempts: 2, .. }));
    }
}
