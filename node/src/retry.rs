//! # Adapter Call Policy
//!
//! Every ledger and blob-store call made by the client goes through
//! [`RetryPolicy::run`], which bounds it with a timeout and retries with
//! exponential backoff.
//!
//! Reads and submissions are treated differently. A read that times out
//! is simply asked again. A submission that times out may or may not have
//! been committed, so it is reported as [`ClientError::Timeout`] and left
//! for the caller to reconcile by reading state; submissions are only
//! repeated when the adapter said outright that it was unavailable.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use edelivery_contracts::LedgerError;
use edelivery_protocol::config::{
    ADAPTER_MAX_ATTEMPTS, ADAPTER_RETRY_BASE_DELAY, ADAPTER_TIMEOUT,
};
use edelivery_protocol::storage::BlobError;
use tracing::warn;

use crate::client::ClientError;

/// Errors that say whether the same call may succeed if repeated.
pub trait Transient {
    /// True when the failure was about reaching the adapter, not about
    /// the request.
    fn is_transient(&self) -> bool;
}

impl Transient for LedgerError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

impl Transient for BlobError {
    fn is_transient(&self) -> bool {
        matches!(self, BlobError::Unavailable(_))
    }
}

/// Whether a call only observes state or may change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Safe to repeat after a timeout.
    Read,
    /// Repeated only after an explicit `Unavailable`.
    Submit,
}

/// Timeout and backoff applied to adapter calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on a single attempt.
    pub timeout: Duration,
    /// Attempts including the first. Zero behaves as one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: ADAPTER_TIMEOUT,
            max_attempts: ADAPTER_MAX_ATTEMPTS,
            base_delay: ADAPTER_RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Backoff after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Runs `call` under this policy.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &'static str,
        kind: CallKind,
        mut call: F,
    ) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + fmt::Display + Into<ClientError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match tokio::time::timeout(self.timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    if !e.is_transient() || attempt >= max_attempts {
                        return Err(e.into());
                    }
                    warn!(operation, attempt, error = %e, "adapter unavailable, retrying");
                }
                Err(_) => {
                    if kind == CallKind::Submit || attempt >= max_attempts {
                        return Err(ClientError::Timeout {
                            operation,
                            after: self.timeout,
                        });
                    }
                    warn!(operation, attempt, "adapter timed out, retrying");
                }
            }
            tokio::time::sleep(self.delay_after(attempt)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use edelivery_contracts::DeliveryError;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(1),
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }

    #[test]
    fn backoff_doubles() {
        let p = policy();
        assert_eq!(p.delay_after(1), Duration::from_millis(100));
        assert_eq!(p.delay_after(2), Duration::from_millis(200));
        assert_eq!(p.delay_after(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_is_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let out = policy()
            .run("create", CallKind::Submit, move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(LedgerError::Unavailable("down".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = policy()
            .run("accept", CallKind::Submit, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(LedgerError::Rejected(DeliveryError::InvalidResponse)) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Ledger(LedgerError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = policy()
            .run("get", CallKind::Read, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(BlobError::Unavailable("down".into())) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Blob(BlobError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let out = policy()
            .run("get_state", CallKind::Read, move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        std::future::pending::<()>().await;
                    }
                    Ok::<_, LedgerError>(n)
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_timeout_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = policy()
            .run("finish", CallKind::Submit, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    std::future::pending::<()>().await;
                    Ok::<(), LedgerError>(())
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Timeout {
                operation: "finish",
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
