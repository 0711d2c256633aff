//! Latency Compensator
//!
//! Converts an authoritative nominal position into the position a
//! participant should seek to so that playback resumes in step with
//! everyone else.

use std::time::Duration;

use syncsong_common::time::millis_to_secs;

/// Added to every compensated position to mask the player's own post-seek
/// buffering, and used as the delay before the deferred play
pub const FIXED_BUFFER_DELAY: Duration = Duration::from_millis(150);

/// Upper bound on the one-way delay estimate; bounds clock skew damage
pub const MAX_NETWORK_DELAY: Duration = Duration::from_secs(1);

/// Latency compensation with configurable constants
#[derive(Debug, Clone, Copy)]
pub struct LatencyCompensator {
    buffer_delay: Duration,
    max_network_delay: Duration,
}

impl Default for LatencyCompensator {
    fn default() -> Self {
        Self {
            buffer_delay: FIXED_BUFFER_DELAY,
            max_network_delay: MAX_NETWORK_DELAY,
        }
    }
}

impl LatencyCompensator {
    pub fn new(buffer_delay: Duration, max_network_delay: Duration) -> Self {
        Self {
            buffer_delay,
            max_network_delay,
        }
    }

    pub fn buffer_delay(&self) -> Duration {
        self.buffer_delay
    }

    /// Estimated one-way delay in seconds, clamped to `[0, max_network_delay]`
    ///
    /// A negative difference means the local clock is behind the
    /// authority's; it is treated as zero delay.
    pub fn network_delay(&self, server_time_ms: i64, now_ms: i64) -> f64 {
        let delay = millis_to_secs(now_ms - server_time_ms);
        delay.clamp(0.0, self.max_network_delay.as_secs_f64())
    }

    /// Position to seek to for a nominal position stamped at `server_time_ms`
    pub fn compensate(&self, nominal_secs: f64, server_time_ms: Option<i64>, now_ms: i64) -> f64 {
        let delay = server_time_ms
            .map(|server_time| self.network_delay(server_time, now_ms))
            .unwrap_or(0.0);
        nominal_secs + delay + self.buffer_delay.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: i64 = 1_700_000_000_000;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_normal_delay() {
        let compensator = LatencyCompensator::default();
        assert_close(compensator.compensate(10.0, Some(T), T + 400), 10.55);
    }

    #[test]
    fn test_skew_clamped_to_one_second() {
        let compensator = LatencyCompensator::default();
        assert_close(compensator.compensate(10.0, Some(T), T + 2_000), 11.15);
    }

    #[test]
    fn test_missing_server_time() {
        let compensator = LatencyCompensator::default();
        assert_close(compensator.compensate(10.0, None, T), 10.15);
    }

    #[test]
    fn test_local_clock_behind_authority() {
        let compensator = LatencyCompensator::default();
        assert_close(compensator.compensate(0.0, Some(T), T - 250), 0.15);
    }

    #[test]
    fn test_custom_constants() {
        let compensator =
            LatencyCompensator::new(Duration::from_millis(300), Duration::from_millis(500));
        assert_eq!(compensator.buffer_delay(), Duration::from_millis(300));
        assert_close(compensator.compensate(5.0, Some(T), T + 800), 5.8);
    }
}
