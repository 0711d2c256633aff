//! Timestamp utilities
//!
//! The wire protocol carries instants as integer epoch milliseconds and
//! positions as float seconds.

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a millisecond span to float seconds
pub fn millis_to_secs(millis: i64) -> f64 {
    millis as f64 / 1000.0
}

/// Convert float seconds to whole milliseconds (rounded)
pub fn secs_to_millis(secs: f64) -> i64 {
    (secs * 1000.0).round() as i64
}
