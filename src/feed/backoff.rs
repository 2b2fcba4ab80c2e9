//! Reconnect delay schedule for the price stream.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay randomly added or removed, in `0.0..=1.0`
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Tracks consecutive failed attempts and hands out the next delay
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of failed attempts since the last successful open
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, without jitter
    pub fn base_delay(&self) -> Duration {
        let exponent = self.attempt.saturating_sub(1).min(32) as i32;
        let millis = self.policy.initial_delay.as_millis() as f64 * self.policy.multiplier.powi(exponent);
        let capped = millis.min(self.policy.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Record a failure and return how long to wait before retrying
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let base = self.base_delay();
        if self.policy.jitter <= 0.0 {
            return base;
        }

        let spread = self.policy.jitter.min(1.0);
        let factor = rand::rng().random_range((1.0 - spread)..=(1.0 + spread));
        let jittered = Duration::from_secs_f64(base.as_secs_f64() * factor);
        jittered.min(self.policy.max_delay)
    }

    /// Forget past failures after a successful open
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: f64) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_exponential_growth_is_capped() {
        let mut backoff = Backoff::new(policy(0.0));
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_millis() as u64).collect();

        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
        assert_eq!(backoff.attempt(), 6);
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut backoff = Backoff::new(policy(0.0));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();

        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut backoff = Backoff::new(policy(0.5));
        for _ in 0..100 {
            backoff.reset();
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(49));
            assert!(delay <= Duration::from_millis(151));
        }
    }
}
