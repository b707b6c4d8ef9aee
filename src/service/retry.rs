use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ServiceError;

/// Bounded exponential backoff for transient service failures.
///
/// The delay before retry `n` (zero based) is
/// `multiplier * 2^(n + 1)` clamped to `[min_delay, max_delay]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub multiplier: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            multiplier: Duration::from_secs(1),
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn none() -> Self {
        Self::new(0)
    }

    pub fn with_delays(mut self, multiplier: Duration, min_delay: Duration, max_delay: Duration) -> Self {
        self.multiplier = multiplier;
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_add(1)).unwrap_or(u32::MAX);
        self.multiplier
            .saturating_mul(factor)
            .clamp(self.min_delay, self.max_delay.max(self.min_delay))
    }

    /// Runs `operation`, retrying only errors for which
    /// [`ServiceError::is_transient`] holds.
    pub async fn run<T, F, Fut>(&self, operation: &str, attempt: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.run_if(operation, ServiceError::is_transient, attempt).await
    }

    /// Runs `operation`, retrying only errors accepted by `retryable`.
    pub async fn run_if<T, P, F, Fut>(
        &self,
        operation: &str,
        retryable: P,
        mut attempt: F,
    ) -> Result<T, ServiceError>
    where
        P: Fn(&ServiceError) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut retry = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if retryable(&err) && retry < self.max_retries => {
                    let delay = self.delay_for(retry);
                    retry += 1;
                    warn!(
                        operation,
                        retry,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "agent service call failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    debug!(operation, retries = retry, error = %err, "agent service call failed");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn default_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        let delays = (0..5).map(|n| policy.delay_for(n).as_secs()).collect::<Vec<_>>();
        assert_eq!(delays, vec![2, 4, 8, 10, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::new(3)
            .run("get_run", || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err(ServiceError::Transport("reset".to_string()))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await
            .expect("eventually succeeds");

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_stop_at_the_budget() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::new(2)
            .run("get_run", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ServiceError::Transport("down".to_string())) }
            })
            .await
            .expect_err("must fail");

        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_predicate_limits_what_is_retried() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::new(3)
            .run_if("create_run", ServiceError::is_replay_safe, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ServiceError::Transport("504".to_string())) }
            })
            .await
            .expect_err("must fail");

        assert!(matches!(err, ServiceError::Transport(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn authentication_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::new(5)
            .run("get_run", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ServiceError::Authentication("401".to_string())) }
            })
            .await
            .expect_err("must fail");

        assert!(matches!(err, ServiceError::Authentication(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
