//! Retry policies - exponential backoff for transient node failures
//!
//! A [`RetryPolicy`] governs how many times a node invocation is retried and
//! how long to wait between attempts. Only
//! [`NodeError::Transient`](crate::node::NodeError::Transient) failures are
//! retried; fatal errors abort the turn immediately. Delays grow
//! exponentially and are jittered by default so a burst of simultaneous
//! failures does not retry in lockstep.
//!
//! With the defaults (3 attempts, 0.5s initial, factor 2.0):
//!
//! ```text
//! attempt 1 fails -> wait ~0.5s -> attempt 2 fails -> wait ~1.0s -> attempt 3
//! ```
//!
//! Jitter multiplies each delay by a random factor in 0.5..1.5.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configurable retry policy with exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total invocation attempts, including the first (minimum 1)
    pub max_attempts: u32,
    /// First backoff interval in seconds
    pub initial_interval: f64,
    /// Multiplier applied per attempt
    pub backoff_factor: f64,
    /// Ceiling for a single backoff interval in seconds
    pub max_interval: f64,
    /// Randomize each delay by 0.5x..1.5x
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 30.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds.max(0.0);
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor.max(1.0);
        self
    }

    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds.max(0.0);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another attempt is allowed after `attempts` completed ones
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Backoff before the attempt following `attempt` (0-based) failures
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exp = self.backoff_factor.powi(attempt.min(30) as i32);
        let mut seconds = (self.initial_interval * exp).min(self.max_interval);
        if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5..1.5);
            seconds *= factor;
        }
        Duration::from_secs_f64(seconds.max(0.0))
    }
}
