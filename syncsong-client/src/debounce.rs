//! Seek Debouncer
//!
//! Filters locally observed positions down to "real seeks" worth relaying.
//! Normal playback progress and short stalls stay below the threshold.

/// Minimum jump from the last forwarded position that counts as a seek
pub const SEEK_THRESHOLD_SECS: f64 = 1.2;

#[derive(Debug, Clone)]
pub struct SeekDebouncer {
    threshold: f64,
    last_forwarded: f64,
}

impl Default for SeekDebouncer {
    fn default() -> Self {
        Self::new(SEEK_THRESHOLD_SECS)
    }
}

impl SeekDebouncer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_forwarded: 0.0,
        }
    }

    pub fn last_forwarded(&self) -> f64 {
        self.last_forwarded
    }

    /// Returns the position to relay as SEEK, if it is a real seek
    pub fn observe(&mut self, position: f64) -> Option<f64> {
        if (position - self.last_forwarded).abs() > self.threshold {
            self.last_forwarded = position;
            Some(position)
        } else {
            None
        }
    }

    /// New media starts from zero
    pub fn reset(&mut self) {
        self.last_forwarded = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_exclusive() {
        let mut debouncer = SeekDebouncer::default();
        assert_eq!(debouncer.observe(1.2), None);
        assert_eq!(debouncer.observe(1.21), Some(1.21));
    }

    #[test]
    fn test_compares_against_last_forwarded_not_last_observed() {
        let mut debouncer = SeekDebouncer::default();
        // Small creeping observations never forward...
        assert_eq!(debouncer.observe(0.5), None);
        assert_eq!(debouncer.observe(1.0), None);
        // ...but the distance is measured from the last forwarded position (0.0)
        assert_eq!(debouncer.observe(1.5), Some(1.5));
        assert_eq!(debouncer.observe(2.6), None);
        assert_eq!(debouncer.observe(2.8), Some(2.8));
    }

    #[test]
    fn test_backward_seek() {
        let mut debouncer = SeekDebouncer::default();
        assert_eq!(debouncer.observe(90.0), Some(90.0));
        assert_eq!(debouncer.observe(30.0), Some(30.0));
        assert_eq!(debouncer.last_forwarded(), 30.0);
    }

    #[test]
    fn test_reset() {
        let mut debouncer = SeekDebouncer::default();
        debouncer.observe(60.0);
        debouncer.reset();
        assert_eq!(debouncer.observe(0.7), None);
    }
}
