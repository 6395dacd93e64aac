//! Reconnect backoff.

use std::time::Duration;

/// Backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry, and after every successful connect.
    pub floor: Duration,
    /// Upper bound on the delay.
    pub ceiling: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(64),
        }
    }
}

/// Exponential backoff: each consecutive failure doubles the delay, up to
/// the ceiling. Retries are unbounded.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.floor;
        Self {
            config,
            current,
            attempts: 0,
        }
    }

    /// Delay for the next retry; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.config.ceiling);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// The delay the next failure would get, without advancing.
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Back to the floor after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.config.floor;
        self.attempts = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
