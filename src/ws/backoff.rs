//! Reconnect policy: exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::constants::{
    DEFAULT_RECONNECT_BASE_DELAY, DEFAULT_RECONNECT_JITTER, DEFAULT_RECONNECT_MAX_ATTEMPTS,
    DEFAULT_RECONNECT_MAX_DELAY,
};

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Jitter as a fraction of the computed delay (0.1 = up to +10%).
    pub jitter: f64,
    /// Attempts allowed before giving up (`None` = unlimited).
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            jitter: DEFAULT_RECONNECT_JITTER,
            max_attempts: Some(DEFAULT_RECONNECT_MAX_ATTEMPTS),
        }
    }
}

/// A scheduled reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number since the last successful connect.
    pub number: u32,
    /// How long to wait before connecting.
    pub delay: Duration,
}

/// Reconnection policy.
///
/// Attempt `n` waits `base_delay × 2^(n-1)` capped at `max_delay`, plus
/// a random jitter of up to `jitter × delay`. Delays never decrease between
/// consecutive attempts and never exceed `max_delay`.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: BackoffConfig,
    attempt_count: u32,
    last_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
            last_delay: Duration::ZERO,
        }
    }

    /// Schedule the next attempt, or `None` once `max_attempts` have been made.
    pub fn next_attempt(&mut self) -> Option<Attempt> {
        if self
            .config
            .max_attempts
            .is_some_and(|max| self.attempt_count >= max)
        {
            return None;
        }
        self.attempt_count += 1;

        let delay = self
            .apply_jitter(self.base_for(self.attempt_count))
            .max(self.last_delay)
            .min(self.config.max_delay);
        self.last_delay = delay;

        Some(Attempt {
            number: self.attempt_count,
            delay,
        })
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
        self.last_delay = Duration::ZERO;
    }

    /// Attempts made since the last reset.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Un-jittered delay for attempt `n` (1-based).
    fn base_for(&self, n: u32) -> Duration {
        let factor = 2u32.saturating_pow(n.saturating_sub(1));
        self.config
            .base_delay
            .saturating_mul(factor)
            .min(self.config.max_delay)
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.config.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let max_extra = delay.as_secs_f64() * self.config.jitter;
        let extra = rand::rng().random_range(0.0..=max_extra);
        delay.saturating_add(Duration::try_from_secs_f64(extra).unwrap_or(Duration::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, max_ms: u64, jitter: f64, max_attempts: Option<u32>) -> ReconnectPolicy {
        ReconnectPolicy::new(BackoffConfig {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            jitter,
            max_attempts,
        })
    }

    #[test]
    fn doubles_up_to_ceiling() {
        let mut p = policy(100, 1_000, 0.0, None);
        let delays: Vec<u64> = (0..6)
            .map(|_| p.next_attempt().unwrap().delay.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn attempts_are_numbered_and_bounded() {
        let mut p = policy(10, 100, 0.0, Some(3));
        let numbers: Vec<u32> = std::iter::from_fn(|| p.next_attempt())
            .map(|a| a.number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(p.attempt_count(), 3);
        assert!(p.next_attempt().is_none());

        p.reset();
        assert_eq!(p.next_attempt().map(|a| (a.number, a.delay)), Some((1, Duration::from_millis(10))));
    }

    #[test]
    fn jittered_delays_never_decrease_or_exceed_ceiling() {
        for _ in 0..50 {
            let mut p = policy(100, 1_500, 0.5, Some(12));
            let mut prev = Duration::ZERO;
            while let Some(a) = p.next_attempt() {
                assert!(a.delay >= prev, "{:?} < {:?}", a.delay, prev);
                assert!(a.delay <= Duration::from_millis(1_500));
                assert!(a.delay >= Duration::from_millis(100));
                prev = a.delay;
            }
        }
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let p = policy(1_000, 60_000, 0.0, None);
        assert_eq!(p.base_for(64), Duration::from_millis(60_000));
    }

    #[test]
    fn jitter_on_a_huge_delay_saturates() {
        let mut p = ReconnectPolicy::new(BackoffConfig {
            base_delay: Duration::MAX,
            max_delay: Duration::MAX,
            jitter: 1.0,
            max_attempts: Some(3),
        });
        for _ in 0..3 {
            assert_eq!(p.next_attempt().map(|a| a.delay), Some(Duration::MAX));
        }
    }

    #[test]
    fn zero_max_attempts_never_retries() {
        let mut p = policy(10, 100, 0.0, Some(0));
        assert!(p.next_attempt().is_none());
    }
}
