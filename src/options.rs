use std::time::Duration;

use crate::{Result, WallarmError};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Number of retries and min/max delays used when the client exponentially
/// backs off after errored requests.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    min_retry_delay: Duration,
    max_retry_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy, rejecting a minimum delay above the maximum.
    pub fn new(max_retries: u32, min_retry_delay: Duration, max_retry_delay: Duration) -> Result<Self> {
        if min_retry_delay > max_retry_delay {
            return Err(WallarmError::Config(format!(
                "minimum retry delay {min_retry_delay:?} exceeds maximum retry delay {max_retry_delay:?}"
            )));
        }
        Ok(Self {
            max_retries,
            min_retry_delay,
            max_retry_delay,
        })
    }

    /// Same as [`RetryPolicy::new`] with delays given in whole seconds.
    pub fn from_secs(max_retries: u32, min_retry_delay_secs: u64, max_retry_delay_secs: u64) -> Result<Self> {
        Self::new(
            max_retries,
            Duration::from_secs(min_retry_delay_secs),
            Duration::from_secs(max_retry_delay_secs),
        )
    }

    /// Policy that performs exactly one attempt.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Maximum number of retries after the initial attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn min_retry_delay(&self) -> Duration {
        self.min_retry_delay
    }

    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    /// Delay to wait before attempt number `attempt` (0-based).
    ///
    /// Attempt 0 never waits; attempt `i` waits
    /// `min(max_retry_delay, min_retry_delay * 2^(i-1))`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.min_retry_delay.is_zero() {
            return Duration::ZERO;
        }
        let cap = self.max_retry_delay.as_nanos();
        let nanos = 2u128
            .checked_pow(attempt - 1)
            .and_then(|factor| self.min_retry_delay.as_nanos().checked_mul(factor));
        match nanos {
            // below the cap, so the whole seconds fit in u64
            Some(nanos) if nanos < cap => Duration::new(
                (nanos / NANOS_PER_SEC) as u64,
                (nanos % NANOS_PER_SEC) as u32,
            ),
            _ => self.max_retry_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}
