//! Retry policy for background acquisition loops.
//!
//! # Design Decisions
//! - Fixed delay between attempts (no exponential growth, no jitter)
//! - Unbounded by default; an attempt ceiling is opt-in

use std::time::Duration;

use crate::config::IdentityConfig;

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between a failed attempt and the next one.
    pub delay: Duration,
    /// Maximum number of attempts, `None` for unlimited.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever with a fixed delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Cap the total number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether another attempt is allowed after `attempts_made` failures.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        match self.max_attempts {
            None => true,
            Some(max) => attempts_made < max,
        }
    }
}

impl From<&IdentityConfig> for RetryPolicy {
    fn from(config: &IdentityConfig) -> Self {
        Self {
            delay: Duration::from_secs(config.retry_delay_secs),
            max_attempts: config.max_attempts,
        }
    }
}
