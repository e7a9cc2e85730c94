use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempt limit and pause between attempts for polling actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: usize,
    /// Pause between two attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Policy that keeps polling until the timeout is used up
    pub fn for_timeout(timeout: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let attempts = (timeout.as_millis() / interval_ms) as usize + 1;
        Self::new(attempts, interval)
    }
}

/// Run an operation until it succeeds or the attempts of the policy are used up.
///
/// The operation receives the current attempt number starting at 1. The
/// error of the last attempt is returned on failure.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, log_context: &str, operation: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    with_retry_and_backoff(policy.max_attempts, log_context, constant_backoff(policy.delay), operation).await
}

/// Retry with a custom backoff strategy
pub async fn with_retry_and_backoff<T, E, F, Fut, B>(
    max_attempts: usize,
    log_context: &str,
    backoff_fn: B,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    B: Fn(usize) -> Duration,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded after {} attempts", log_context, attempt);
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                warn!("{} failed after {} attempts: {}", log_context, attempt, e);
                return Err(e);
            }
            Err(e) => {
                let delay = backoff_fn(attempt);
                debug!(
                    "{} not satisfied (attempt {}/{}): {}. Retrying in {:?}",
                    log_context, attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Same delay before every retry
pub fn constant_backoff(delay: Duration) -> impl Fn(usize) -> Duration + Send + Sync {
    move |_| delay
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retry_until_success() {
        let counter = AtomicUsize::new(0);

        let result = retry(
            RetryPolicy::new(5, Duration::from_millis(1)),
            "test operation",
            |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("Failed attempt {}", attempt))
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_max_attempts() {
        let result: Result<(), String> = retry(
            RetryPolicy::new(3, Duration::from_millis(1)),
            "failing operation",
            |attempt| async move { Err(format!("Failed attempt {}", attempt)) },
        )
        .await;

        assert_eq!(result.unwrap_err(), "Failed attempt 3");
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        assert_eq!(policy.max_attempts, 1);

        let result: Result<(), String> = retry(policy, "single attempt", |attempt| async move {
            Err(format!("Failed attempt {}", attempt))
        })
        .await;
        assert_eq!(result.unwrap_err(), "Failed attempt 1");
    }

    #[test]
    fn test_constant_backoff() {
        let constant = constant_backoff(Duration::from_millis(100));
        assert_eq!(constant(1), Duration::from_millis(100));
        assert_eq!(constant(5), Duration::from_millis(100));
    }

    #[test]
    fn test_policy_for_timeout() {
        let policy = RetryPolicy::for_timeout(Duration::from_millis(1000), Duration::from_millis(250));
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }
}
