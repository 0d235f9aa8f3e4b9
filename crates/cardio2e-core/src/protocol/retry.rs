//! Bounded retry helper shared by queries and login

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::ProtocolError;

/// Timeout, attempt budget and pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline of a single attempt
    pub timeout: Duration,
    /// Number of attempts before giving up
    pub max_attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(timeout: Duration, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            timeout,
            max_attempts,
            backoff,
        }
    }

    /// Run `attempt` until it yields a value or the budget is spent
    ///
    /// Each call receives the 1-based attempt number and the deadline of that
    /// attempt. `Ok(None)` and recoverable errors count as a failed attempt;
    /// a fatal error ([`ProtocolError::is_fatal`]) aborts immediately. The
    /// backoff sleep happens outside `attempt`, so locks taken inside it are
    /// never held across the pause.
    pub fn run<T, F>(&self, operation: &str, mut attempt: F) -> Result<T, ProtocolError>
    where
        F: FnMut(u32, Instant) -> Result<Option<T>, ProtocolError>,
    {
        for n in 1..=self.max_attempts {
            let deadline = Instant::now() + self.timeout;
            match attempt(n, deadline) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {
                    debug!("{}: attempt {}/{} timed out", operation, n, self.max_attempts);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!("{}: attempt {}/{} failed: {}", operation, n, self.max_attempts, e);
                }
            }

            if n < self.max_attempts && !self.backoff.is_zero() {
                thread::sleep(self.backoff);
            }
        }

        Err(ProtocolError::RetriesExhausted {
            operation: operation.to_string(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(5), attempts, Duration::ZERO)
    }

    #[test]
    fn test_returns_first_success() {
        let mut calls = 0;
        let result = policy(5).run("@G L 1", |n, _| {
            calls += 1;
            Ok(if n == 3 { Some(n) } else { None })
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_exhaustion_counts_every_attempt() {
        let mut calls = 0;
        let result: Result<(), _> = policy(4).run("@G L 1", |_, _| {
            calls += 1;
            Err(ProtocolError::SerialError("no answer".to_string()))
        });
        assert_eq!(calls, 4);
        match result {
            Err(ProtocolError::RetriesExhausted { operation, attempts }) => {
                assert_eq!(operation, "@G L 1");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_fatal_error_aborts() {
        let mut calls = 0;
        let result: Result<(), _> = policy(4).run("@G L 1", |_, _| {
            calls += 1;
            Err(ProtocolError::NotConnected)
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(ProtocolError::NotConnected)));
    }

    #[test]
    fn test_deadline_is_per_attempt() {
        let start = Instant::now();
        let mut deadlines = Vec::new();
        let _: Result<(), _> = policy(2).run("@G L 1", |_, deadline| {
            deadlines.push(deadline);
            thread::sleep(Duration::from_millis(5));
            Ok(None)
        });
        assert_eq!(deadlines.len(), 2);
        assert!(deadlines[0] >= start + Duration::from_millis(5));
        assert!(deadlines[1] > deadlines[0]);
    }
}
