//! Capped exponential backoff for re-establishing a lost channel

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::ReconnectError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the `attempt`-th retry (1-based): `min(base * 2^(attempt-1), max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Attempt counter driven by a [`ReconnectPolicy`]
#[derive(Debug, Default)]
pub struct Reconnector {
    policy: ReconnectPolicy,
    attempts: AtomicU32,
}

impl Reconnector {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Count one more attempt and return how long to wait before making it.
    /// Fails once the attempt budget is spent; the counter is left untouched then.
    pub fn next_delay(&self) -> Result<Duration, ReconnectError> {
        let attempts = self.attempts.load(Ordering::Acquire);
        if attempts >= self.policy.max_attempts {
            return Err(ReconnectError::MaxAttemptsExceeded { attempts });
        }
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(self.policy.delay_for(attempt))
    }

    /// Called after a successful (re)connect
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::Release);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }
}
