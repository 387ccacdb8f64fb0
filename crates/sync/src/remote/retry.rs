use std::time::Duration;

use tracing::warn;

use crate::error::RemoteError;

/// Backoff schedule for a single remote call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    /// Same attempt budget, no sleeping. Used by tests and offline runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::new(max_attempts)
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Wait before the retry that follows `failed_attempts` failures.
    pub fn delay_for_attempt(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(failed_attempts.saturating_sub(1) as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. A rate-limit hint from the server
    /// replaces the computed backoff.
    pub fn run<T>(
        &self,
        operation: &str,
        mut call: impl FnMut() -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = match &err {
                        RemoteError::RateLimited {
                            retry_after_secs: Some(secs),
                        } => Duration::from_secs(*secs),
                        _ => self.delay_for_attempt(attempt),
                    };
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "remote call failed, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default().with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn transient_failures_are_retried() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;
        let result = policy.run("get", || {
            calls += 1;
            if calls < 3 {
                Err(RemoteError::Http {
                    status: 502,
                    message: "bad gateway".to_string(),
                })
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.expect("third attempt succeeds"), 3);
    }

    #[test]
    fn rate_limit_hint_is_retried() {
        let policy = RetryPolicy::immediate(2);
        let mut calls = 0;
        let result = policy.run("get", || {
            calls += 1;
            if calls == 1 {
                Err(RemoteError::RateLimited {
                    retry_after_secs: Some(0),
                })
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls, 2);
    }

    #[test]
    fn client_errors_fail_immediately() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;
        let result: Result<(), _> = policy.run("patch", || {
            calls += 1;
            Err(RemoteError::InvalidToken(401))
        });
        assert!(matches!(result, Err(RemoteError::InvalidToken(401))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn exhausted_budget_returns_last_error() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;
        let result: Result<(), _> = policy.run("get", || {
            calls += 1;
            Err(RemoteError::Transport(format!("reset {calls}")))
        });
        match result {
            Err(RemoteError::Transport(message)) => assert_eq!(message, "reset 3"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls, 3);
    }
}
