use std::time::Duration;

use tracing::{debug, warn};

use crate::{StoreError, StoreResult};

/// How often an aborted transaction is re-run before the error surfaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 10, max_delay_ms: 250 }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts; for tests and the in-memory store.
    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, base_delay_ms: 0, max_delay_ms: 0 }
    }
}

/// Delay before `attempt` (1-based).
///
/// Attempt 1: immediate
/// Attempt 2: base
/// Attempt n: base * 2^(n-2), capped at max
pub fn retry_backoff_ms(policy: &RetryPolicy, attempt: u32) -> u64 {
    if attempt <= 1 {
        return 0;
    }
    let exp = (attempt - 2).min(16);
    policy.base_delay_ms.saturating_mul(1u64 << exp).min(policy.max_delay_ms)
}

/// Run `op` until it commits, re-running it while it fails with
/// [`StoreError::TransactionAborted`]. Any other error is returned at once.
///
/// `op` must be a complete transaction: everything it read is re-read on the
/// next attempt.
pub fn with_retryable_transaction<T>(
    policy: &RetryPolicy,
    label: &str,
    mut op: impl FnMut() -> StoreResult<T>,
) -> StoreResult<T> {
    let max = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(StoreError::TransactionAborted(reason)) if attempt < max => {
                attempt += 1;
                let delay = retry_backoff_ms(policy, attempt);
                debug!(label, attempt, delay_ms = delay, reason = %reason, "retrying aborted transaction");
                if delay > 0 {
                    std::thread::sleep(Duration::from_millis(delay));
                }
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(label, attempts = attempt, error = %e, "transaction retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule() {
        let p = RetryPolicy { max_attempts: 5, base_delay_ms: 10, max_delay_ms: 50 };
        assert_eq!(retry_backoff_ms(&p, 1), 0);
        assert_eq!(retry_backoff_ms(&p, 2), 10);
        assert_eq!(retry_backoff_ms(&p, 3), 20);
        assert_eq!(retry_backoff_ms(&p, 4), 40);
        assert_eq!(retry_backoff_ms(&p, 5), 50);
        assert_eq!(retry_backoff_ms(&p, 60), 50);
    }

    #[test]
    fn retries_until_commit() {
        let mut calls = 0;
        let out = with_retryable_transaction(&RetryPolicy::immediate(3), "t", || {
            calls += 1;
            if calls < 3 {
                Err(StoreError::TransactionAborted("busy".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(out.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let out: StoreResult<()> = with_retryable_transaction(&RetryPolicy::immediate(2), "t", || {
            calls += 1;
            Err(StoreError::TransactionAborted("busy".into()))
        });
        assert!(matches!(out, Err(StoreError::TransactionAborted(_))));
        assert_eq!(calls, 2);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let mut calls = 0;
        let out: StoreResult<()> = with_retryable_transaction(&RetryPolicy::immediate(5), "t", || {
            calls += 1;
            Err(StoreError::Backend("disk full".into()))
        });
        assert!(out.is_err());
        assert_eq!(calls, 1);
    }
}
