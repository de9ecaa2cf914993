//! Retry budget and exponential backoff for deliveries.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How often, and how patiently, a failed delivery is retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per event, the first one included.
    pub max_attempts: u32,
    /// Delay after the first failure, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// `max_attempts` tries with no delay between them.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
            jitter: false,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Check the policy is usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry budget must allow at least one attempt".into());
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(format!("backoff multiplier must be >= 1.0, got {}", self.multiplier));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err("initial backoff exceeds maximum backoff".into());
        }
        Ok(())
    }

    /// Delay before retry number `retry` (0 = after the first failure).
    ///
    /// Jitter is added before the cap, so no delay exceeds `max_backoff_ms`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        let base = if base.is_finite() && base < self.max_backoff_ms as f64 {
            base as u64
        } else {
            self.max_backoff_ms
        };

        let jittered = if self.jitter && base > 0 {
            base.saturating_add(rand::thread_rng().gen_range(0..=base / 4))
        } else {
            base
        };
        Duration::from_millis(jittered.min(self.max_backoff_ms))
    }
}
