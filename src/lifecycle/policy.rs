//! Poll interval and deadline settings.

use std::time::Duration;

use thiserror::Error;

/// Default delay between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default deadline for a resource to reach a terminal state.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors raised when a poll policy is inconsistent.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum PolicyError {
    /// Raised when the interval is zero.
    #[error("poll interval must be greater than zero")]
    ZeroInterval,
    /// Raised when the timeout is zero.
    #[error("wait timeout must be greater than zero")]
    ZeroTimeout,
    /// Raised when the timeout is shorter than one interval.
    #[error("wait timeout {timeout:?} is shorter than the poll interval {interval:?}")]
    TimeoutShorterThanInterval {
        /// Requested interval.
        interval: Duration,
        /// Requested timeout.
        timeout: Duration,
    },
}

/// How often to poll and how long to keep polling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    interval: Duration,
    timeout: Duration,
}

impl PollPolicy {
    /// Builds a validated policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when either duration is zero or the timeout is
    /// shorter than the interval.
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self, PolicyError> {
        if interval.is_zero() {
            return Err(PolicyError::ZeroInterval);
        }
        if timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }
        if timeout < interval {
            return Err(PolicyError::TimeoutShorterThanInterval { interval, timeout });
        }
        Ok(Self { interval, timeout })
    }

    /// Delay between two status checks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Deadline measured from the first status check.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}
