use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::error::Result;

/// Bounded retry with exponential backoff for job store calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt before giving up.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// delay = base_delay_ms * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Runs `op`, retrying only retryable errors until the budget is spent.
    pub async fn run<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay_ms = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        operation = what,
                        attempt,
                        max = self.max_retries,
                        delay_ms,
                        error = %e,
                        "Retrying job store call"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FinchError;

    #[test]
    fn exponential_backoff() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1000,
        };
        assert_eq!(config.delay_for_attempt(1), 1000);
        assert_eq!(config.delay_for_attempt(2), 2000);
        assert_eq!(config.delay_for_attempt(3), 4000);
        assert_eq!(config.delay_for_attempt(4), 8000);
    }

    #[test]
    fn backoff_saturates() {
        let config = RetryConfig {
            max_retries: 100,
            base_delay_ms: u64::MAX / 2,
        };
        assert_eq!(config.delay_for_attempt(80), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let config = RetryConfig::default();
        let mut calls = 0;
        let value = config
            .run("create", || {
                calls += 1;
                if calls < 3 {
                    Err(FinchError::StoreUnavailable("busy".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let config = RetryConfig {
            max_retries: 2,
            base_delay_ms: 10,
        };
        let mut calls = 0;
        let err = config
            .run("create", || -> Result<()> {
                calls += 1;
                Err(FinchError::StoreUnavailable("down".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FinchError::StoreUnavailable(_)));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn does_not_retry_validation_errors() {
        let config = RetryConfig::default();
        let mut calls = 0;
        let err = config
            .run("create", || -> Result<()> {
                calls += 1;
                Err(FinchError::UnknownProcess("missing".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FinchError::UnknownProcess(_)));
        assert_eq!(calls, 1);
    }
}
