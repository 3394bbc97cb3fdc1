//! Retry logic with a fixed delay for transient connection errors.

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Retry budget for opening a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Pause between attempts
    #[serde(with = "crate::session::secs")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

/// Which attempt is running. Passed by value to each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    /// Current attempt (1-indexed)
    pub attempt: u32,
    pub max_attempts: u32,
}

impl AttemptContext {
    pub fn is_last(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called after a failed attempt that will be retried.
    fn on_retry(&self, attempt: AttemptContext, error: &SessionError, delay: Duration);
}

/// Execute an operation with retry logic.
///
/// Non-retryable errors are returned at once. After the last attempt the
/// last error is returned.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(AttemptContext) -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);

    let mut attempt = 1;
    loop {
        let ctx = AttemptContext {
            attempt,
            max_attempts,
        };

        match operation(ctx) {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || ctx.is_last() => return Err(e),
            Err(e) => {
                if let Some(cb) = callback {
                    cb.on_retry(ctx, &e, config.delay);
                }
                thread::sleep(config.delay);
            }
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            delay: Duration::from_millis(1),
        }
    }

    fn refused() -> SessionError {
        SessionError::Connect {
            message: "Connection refused".to_string(),
        }
    }

    #[test]
    fn test_with_retry_success_first_try() {
        let result = with_retry(&RetryConfig::no_retry(), None, |_| Ok(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_with_retry_eventual_success() {
        let attempts = Cell::new(0);

        let result = with_retry(&fast(3), None, |ctx| {
            attempts.set(ctx.attempt);
            if ctx.attempt < 3 { Err(refused()) } else { Ok(ctx) }
        });

        let ctx = result.unwrap();
        assert_eq!(ctx.attempt, 3);
        assert!(ctx.is_last());
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_with_retry_all_attempts_fail() {
        let attempts = Cell::new(0);

        let result: Result<()> = with_retry(&fast(3), None, |_| {
            attempts.set(attempts.get() + 1);
            Err(refused())
        });

        assert!(matches!(result, Err(SessionError::Connect { .. })));
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_with_retry_authentication_is_terminal() {
        let attempts = Cell::new(0);

        let result: Result<()> = with_retry(&fast(3), None, |_| {
            attempts.set(attempts.get() + 1);
            Err(SessionError::Authentication {
                message: "Permission denied".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_with_retry_timeout_is_terminal() {
        let attempts = Cell::new(0);

        let result: Result<()> = with_retry(&fast(3), None, |_| {
            attempts.set(attempts.get() + 1);
            Err(SessionError::Unreachable {
                message: "Connection timed out".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let attempts = Cell::new(0);
        let _: Result<()> = with_retry(&fast(0), None, |_| {
            attempts.set(attempts.get() + 1);
            Err(refused())
        });
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_callback_invoked() {
        struct CountingCallback(Arc<AtomicU32>);
        impl RetryCallback for CountingCallback {
            fn on_retry(&self, _: AttemptContext, _: &SessionError, _: Duration) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicU32::new(0));
        let callback = CountingCallback(count.clone());

        let _: Result<()> = with_retry(&fast(3), Some(&callback), |_| Err(refused()));

        // Not after the last attempt
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_config_from_toml() {
        let config: RetryConfig = toml::from_str("max_attempts = 5\ndelay = 2").unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.delay, Duration::from_secs(2));

        let config: RetryConfig = toml::from_str("").unwrap();
        assert_eq!(config, RetryConfig::default());
    }
}
