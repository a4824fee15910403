//! Histogram interval tokens

use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Encode a duration as a fixed interval token in the largest unit not
/// exceeding it, truncating: 59s -> "59s", 90s -> "1m", 25h -> "1d".
/// A zero duration encodes to "" (auto bucketing).
pub fn interval_token(interval: Duration) -> String {
    if interval.is_zero() {
        return String::new();
    }
    let secs = interval.as_secs();
    if secs < MINUTE {
        format!("{}s", secs)
    } else if secs < HOUR {
        format!("{}m", secs / MINUTE)
    } else if secs < DAY {
        format!("{}h", secs / HOUR)
    } else {
        format!("{}d", secs / DAY)
    }
}
