//! Retry policy and exponential backoff.

use std::time::Duration;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of consecutive reconnection attempts.
    pub max_attempts: u32,
    /// Delay before the first reconnection attempt.
    pub base_delay: Duration,
    /// Ceiling for the delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Tracks consecutive failures and the delay for the next attempt.
///
/// The delay doubles as soon as an attempt is scheduled, not when that
/// attempt is later confirmed to have failed.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    attempt: u32,
    current_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with no failed attempts.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        let current_delay = config.base_delay.min(config.max_delay);
        Self {
            config,
            attempt: 0,
            current_delay,
        }
    }

    /// Consecutive attempts since the last successful connection.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay the next scheduled attempt will wait.
    #[must_use]
    pub const fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// The configuration this policy was built from.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether no further attempts may be scheduled.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempt >= self.config.max_attempts
    }

    /// Consume one attempt and return the delay to wait before it.
    ///
    /// Returns `None` once `max_attempts` attempts have been scheduled.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        self.attempt += 1;
        let delay = self.current_delay;
        self.current_delay = self
            .current_delay
            .saturating_mul(2)
            .min(self.config.max_delay);

        Some(delay)
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_delay = self.config.base_delay.min(self.config.max_delay);
    }

    /// Reset the attempt counter only, keeping the grown delay.
    ///
    /// Used for an explicit `connect()` after exhaustion.
    pub fn reset_attempts(&mut self) {
        self.attempt = 0;
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
