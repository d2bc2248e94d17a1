//! Epoch unit handling
//!
//! Quotes and patterns carry milliseconds. Store scores and level `last_seen`
//! values are seconds. Readers accept either and normalize by magnitude.

use serde::{Deserialize, Deserializer};

/// Values above this are treated as milliseconds (≈ year 2286 in seconds)
pub const EPOCH_MILLIS_THRESHOLD: f64 = 1e10;

/// Normalize a raw epoch value of unknown unit to seconds
pub fn normalize_epoch_secs(raw: f64) -> f64 {
    if raw > EPOCH_MILLIS_THRESHOLD {
        raw / 1000.0
    } else {
        raw
    }
}

/// Normalize a raw epoch value of unknown unit to milliseconds
pub fn normalize_epoch_millis(raw: f64) -> i64 {
    if raw > EPOCH_MILLIS_THRESHOLD {
        raw.round() as i64
    } else {
        (raw * 1000.0).round() as i64
    }
}

/// Store score for a millisecond timestamp
pub fn millis_to_score_secs(timestamp_ms: i64) -> f64 {
    timestamp_ms as f64 / 1000.0
}

/// Serde adapter accepting an epoch in seconds or milliseconds, integer or float
pub fn deserialize_epoch_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(normalize_epoch_millis(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_seconds_and_millis() {
        assert_eq!(normalize_epoch_millis(1_700_000_000.0), 1_700_000_000_000);
        assert_eq!(normalize_epoch_millis(1_700_000_000_000.0), 1_700_000_000_000);
        assert_eq!(normalize_epoch_secs(1_700_000_000_000.0), 1_700_000_000.0);
        assert_eq!(normalize_epoch_secs(1_700_000_000.5), 1_700_000_000.5);
    }

    #[test]
    fn test_score_is_seconds() {
        assert_eq!(millis_to_score_secs(1_700_000_000_250), 1_700_000_000.25);
    }
}
