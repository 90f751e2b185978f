//! Exponential backoff for exchange retries.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for exchange calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per order submission, first try included.
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Growth factor between attempts.
    pub multiplier: f64,
    /// Random spread applied to each delay (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            multiplier: 2.0,
            jitter_factor: 0.1, // 10%
        }
    }
}

impl RetryConfig {
    /// Backoff yielding one delay between each pair of attempts.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            self.multiplier,
            self.max_attempts.saturating_sub(1),
            self.jitter_factor,
        )
    }
}

/// Exponential backoff state machine.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    max_retries: u32,
    jitter_factor: f64,
    current_attempt: u32,
    current_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        max_retries: u32,
        jitter_factor: f64,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            max_retries,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            current_attempt: 0,
            current_delay: initial_delay,
        }
    }

    /// Next delay, or `None` once the retry budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_retries {
            return None;
        }

        let delay = self.with_jitter(self.current_delay);

        self.current_attempt += 1;
        self.current_delay = std::cmp::min(
            Duration::from_secs_f64(self.current_delay.as_secs_f64() * self.multiplier),
            self.max_delay,
        );

        Some(delay)
    }

    fn with_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor == 0.0 {
            return delay;
        }
        let jitter = rand::rng().random::<f64>() * self.jitter_factor;
        let factor = 1.0 + (jitter - self.jitter_factor / 2.0);
        Duration::from_secs_f64(delay.as_secs_f64() * factor)
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
        self.current_delay = self.initial_delay;
    }

    pub fn attempt_number(&self) -> u32 {
        self.current_attempt
    }

    pub fn can_retry(&self) -> bool {
        self.current_attempt < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(300),
            2.0,
            5,
            0.0,
        );

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.attempt_number(), 4);
    }

    #[test]
    fn test_retry_config_bounds_attempts() {
        let config = RetryConfig {
            max_attempts: 3,
            jitter_factor: 0.0,
            ..Default::default()
        };
        let mut backoff = config.backoff();

        // Two waits separate three attempts.
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert!(!backoff.can_retry());

        backoff.reset();
        assert!(backoff.can_retry());
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(1000),
            Duration::from_secs(10),
            1.0,
            50,
            0.2,
        );
        for _ in 0..50 {
            let d = backoff.next_delay().unwrap();
            assert!(d >= Duration::from_millis(899) && d <= Duration::from_millis(1101));
        }
    }
}
