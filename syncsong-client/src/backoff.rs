//! Reconnect backoff
//!
//! Exponential delays with jitter, bounded both in size and in the
//! number of consecutive attempts.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_attempts: u32,
    attempt: u32,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
            attempt: 0,
            jitter: true,
        }
    }

    /// Deterministic delays (tests)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Consecutive failed attempts so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, or `None` once the ceiling is reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let exponent = self.attempt.min(16);
        self.attempt += 1;

        let ceiling = self
            .base
            .saturating_mul(1u32 << exponent)
            .min(self.max);
        if !self.jitter || ceiling.is_zero() {
            return Some(ceiling);
        }

        // Half fixed, half random so retries never collapse to zero
        let half = ceiling / 2;
        let spread = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
        Some(half + Duration::from_millis(spread))
    }

    /// The link recovered: the room delivered authoritative state again
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_until_capped() {
        let mut backoff =
            Backoff::new(Duration::from_millis(500), Duration::from_secs(3), 10).without_jitter();
        let delays: Vec<_> = std::iter::from_fn(|| backoff.next_delay()).take(5).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_secs(3),
                Duration::from_secs(3),
            ]
        );
    }

    #[test]
    fn test_gives_up_at_ceiling() {
        let mut backoff =
            Backoff::new(Duration::from_millis(10), Duration::from_secs(1), 3).without_jitter();
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), 3);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut backoff = Backoff::new(Duration::from_millis(400), Duration::from_secs(30), 5);
        for expected_ceiling in [400u64, 800, 1600, 3200, 6400] {
            let delay = backoff.next_delay().unwrap().as_millis() as u64;
            assert!(delay >= expected_ceiling / 2 && delay <= expected_ceiling);
        }
    }
}
