// rust/ckpt-client/src/retry.rs

//! Retry budget for channel I/O.
//!
//! Transient failures (an interrupted system call, a momentarily full or
//! empty socket buffer) are retried with a short exponential backoff. Once
//! the budget is spent the last error is surfaced to the caller.

use std::time::Duration;

use crate::config::TransportConfig;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential backoff).
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

impl From<&TransportConfig> for RetryConfig {
    fn from(transport: &TransportConfig) -> Self {
        Self {
            max_retries: transport.max_retries,
            initial_delay: Duration::from_millis(transport.retry_delay_ms),
            max_delay: Duration::from_millis(transport.max_retry_delay_ms),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Creates a retry configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculates the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt >= self.max_retries {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt as i32);

        Duration::from_secs_f64(base_delay.min(self.max_delay.as_secs_f64()))
    }

    /// Returns true if more retries are allowed for the given attempt.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Outcome of one attempt of a retryable operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Ok(T),
    /// Operation failed but can be retried.
    Retry(E),
    /// Operation failed and should not be retried.
    Fail(E),
}

/// Runs `operation` until it succeeds, fails permanently, or the budget in
/// `config` is exhausted. Blocks the calling thread between attempts.
pub fn retry_blocking<T, E, F>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> RetryResult<T, E>,
{
    let mut attempt = 0;

    loop {
        match operation() {
            RetryResult::Ok(value) => return Ok(value),
            RetryResult::Fail(error) => return Err(error),
            RetryResult::Retry(error) => {
                if !config.should_retry(attempt) {
                    return Err(error);
                }

                let delay = config.delay_for_attempt(attempt);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_from_transport_config() {
        let transport = TransportConfig {
            max_retries: 3,
            retry_delay_ms: 2,
            max_retry_delay_ms: 50,
        };

        let config = RetryConfig::from(&transport);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(2));
        assert_eq!(config.max_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_retries, 0);
        assert!(!config.should_retry(0));
    }

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(6),
            backoff_multiplier: 2.0,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(4));
        // Capped at max_delay
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(6));
        // Past the budget
        assert_eq!(config.delay_for_attempt(5), Duration::ZERO);
    }

    #[test]
    fn test_retry_blocking_eventual_success() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
        };

        let attempts = Cell::new(0);
        let result = retry_blocking(&config, || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                RetryResult::Retry("not yet")
            } else {
                RetryResult::Ok(42)
            }
        });

        assert_eq!(result, Ok(42));
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_retry_blocking_exhausted() {
        let config = RetryConfig {
            max_retries: 2,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        };

        let attempts = Cell::new(0);
        let result: Result<i32, _> = retry_blocking(&config, || {
            attempts.set(attempts.get() + 1);
            RetryResult::Retry("always fails")
        });

        assert_eq!(result, Err("always fails"));
        // Initial attempt + 2 retries
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_retry_blocking_fail_is_immediate() {
        let attempts = Cell::new(0);
        let result: Result<i32, _> = retry_blocking(&RetryConfig::default(), || {
            attempts.set(attempts.get() + 1);
            RetryResult::Fail("fatal")
        });

        assert_eq!(result, Err("fatal"));
        assert_eq!(attempts.get(), 1);
    }
}
