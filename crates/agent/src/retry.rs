use std::future::Future;
use std::time::Duration;

use tellr_core::errors::CollaboratorError;
use tracing::warn;

/// Retry budget for idempotent reads (classification, retrieval, ledger queries). Transfers and
/// secret verification never go through here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries, base_delay: Duration::from_millis(100) }
    }

    pub fn none() -> Self {
        Self::new(0)
    }

    fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry.min(16)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the retry budget is spent.
/// Backoff doubles from `base_delay`.
pub async fn with_retries<T, F, Fut>(
    policy: RetryPolicy,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                warn!(
                    event_name = "collaborator.retry",
                    operation = operation_name,
                    collaborator = error.collaborator(),
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying idempotent collaborator call"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tellr_core::errors::CollaboratorError;

    use super::{with_retries, RetryPolicy};

    fn outage() -> CollaboratorError {
        CollaboratorError::Unavailable { collaborator: "embedder", message: "down".to_string() }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retries(RetryPolicy::new(3), "embed", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(outage())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_is_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_retries(RetryPolicy::new(2), "embed", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(outage())
            }
        })
        .await;

        assert_eq!(result, Err(outage()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rejections_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_retries(RetryPolicy::new(5), "ledger.balances", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CollaboratorError::Rejected {
                    collaborator: "ledger",
                    message: "unknown account".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }
}
