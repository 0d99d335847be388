//! Bounded exponential backoff for transient backend faults.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first; `1` disables retrying.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 50, max_backoff_ms: 1_000 }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn none() -> Self {
        Self { max_attempts: 1, initial_backoff_ms: 0, max_backoff_ms: 0 }
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms))
    }

    /// Runs `op`, retrying transient failures until attempts run out.
    ///
    /// # Errors
    /// The last error, or the first non-transient one.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.backoff(attempt);
                    log::debug!("{what} failed (attempt {attempt}/{attempts}): {e}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RepoError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_up_to_cap() {
        let p = RetryPolicy { max_attempts: 5, initial_backoff_ms: 10, max_backoff_ms: 35 };
        assert_eq!(p.backoff(1), Duration::from_millis(10));
        assert_eq!(p.backoff(2), Duration::from_millis(20));
        assert_eq!(p.backoff(3), Duration::from_millis(35));
        assert_eq!(p.backoff(80), Duration::from_millis(35));
    }

    #[tokio::test]
    async fn retries_only_transient_errors() {
        let p = RetryPolicy { max_attempts: 3, initial_backoff_ms: 1, max_backoff_ms: 1 };
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out = p
            .run("flaky", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RepoError::Repository("down".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<()> = p
            .run("conflict", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RepoError::DocumentNotFound("x".into()))
            })
            .await;
        assert!(out.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
