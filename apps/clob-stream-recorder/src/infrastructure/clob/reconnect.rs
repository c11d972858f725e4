//! Reconnection Backoff
//!
//! Exponential backoff with jitter for re-establishing the market stream.
//! The delay grows by `multiplier` after every failed attempt, never exceeds
//! `max_delay`, and drops back to `initial_delay` once a connection has
//! stayed live for at least `reset_after`.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::StreamSettings;

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay, jitter included.
    pub max_delay: Duration,
    /// Growth factor between consecutive attempts.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Live time after which the next loss starts again from `initial_delay`.
    pub reset_after: Duration,
    /// Maximum attempts in a row (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            reset_after: Duration::from_secs(60),
            max_attempts: 0,
        }
    }
}

impl BackoffConfig {
    /// Build backoff parameters from stream settings.
    #[must_use]
    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            reset_after: settings.reconnect_reset_after,
            ..Self::default()
        }
    }
}

/// Backoff state across consecutive reconnect attempts.
#[derive(Debug)]
pub struct BackoffPolicy {
    config: BackoffConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl BackoffPolicy {
    /// Create a policy starting at the initial delay.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Record that a connection was lost after being live for `live_for`.
    ///
    /// A connection that stayed live long enough resets the backoff.
    pub fn on_connection_lost(&mut self, live_for: Option<Duration>) {
        if live_for.is_some_and(|live| live >= self.config.reset_after) {
            self.reset();
        }
    }

    /// Delay to wait before the next attempt, or `None` once attempts run out.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempt_count = self.attempt_count.saturating_add(1);

        let delay = self.apply_jitter(self.current_delay).min(self.config.max_delay);
        self.current_delay = self.grow(self.current_delay);

        Some(delay)
    }

    /// Go back to the initial delay.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn grow(&self, delay: Duration) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let scaled = (delay.as_millis() as f64 * self.config.multiplier).round();
        let max_millis = u64::try_from(self.config.max_delay.as_millis()).unwrap_or(u64::MAX);
        if !scaled.is_finite() || scaled <= 0.0 {
            return self.config.initial_delay;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = (scaled.min(u64::MAX as f64) as u64).min(max_millis);
        Duration::from_millis(millis)
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let spread = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-spread..=spread);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = (base_millis + jitter).max(1.0) as u64;
        Duration::from_millis(millis)
    }
}
