//! Bounded retry for network operations.

use crate::{Error, Result};
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default pause between delayed retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Caller-supplied retry policy.
///
/// A failed attempt is re-issued only while `retryable` holds and the budget
/// is not exhausted. The budget is per invocation of a public operation.
#[derive(Clone)]
pub struct RetryPolicy {
    retryable: Rc<dyn Fn(&Error) -> bool>,
    max_retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(retryable: impl Fn(&Error) -> bool + 'static) -> Self {
        Self {
            retryable: Rc::new(retryable),
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn allows(&self, error: &Error, retries: u32) -> bool {
        retries < self.max_retries && (self.retryable)(error)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// When a retry is re-issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Backoff {
    /// Right away (create)
    Immediate,
    /// After the policy's delay (fetch, update)
    Delayed,
}

/// Run `attempt` until it succeeds or the policy gives up.
pub(crate) async fn run<T, F, Fut>(
    policy: Option<RetryPolicy>,
    backoff: Backoff,
    operation: &'static str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    loop {
        let err = match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        match &policy {
            Some(policy) if policy.allows(&err, retries) => {
                retries += 1;
                tracing::debug!(operation, retries, error = %err, "retrying request");
                if backoff == Backoff::Delayed {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            _ => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn stops_after_budget() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(|_| true)
            .with_max_retries(2)
            .with_delay(Duration::from_millis(1));

        let result: Result<()> = run(Some(policy), Backoff::Delayed, "test", || {
            calls.set(calls.get() + 1);
            async { Err(Error::MissingId) }
        })
        .await;

        assert_eq!(result, Err(Error::MissingId));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn predicate_gates_retries() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(|err| matches!(err, Error::MissingBody));

        let result: Result<()> = run(Some(policy), Backoff::Immediate, "test", || {
            calls.set(calls.get() + 1);
            async { Err(Error::MissingId) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(|_| true);

        let result = run(Some(policy), Backoff::Immediate, "test", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(Error::MissingId)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn no_policy_means_no_retry() {
        let calls = Cell::new(0);
        let result: Result<()> = run(None, Backoff::Delayed, "test", || {
            calls.set(calls.get() + 1);
            async { Err(Error::MissingId) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
