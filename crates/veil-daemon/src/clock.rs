//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Current instant as nanoseconds since the Unix epoch.
///
/// Timestamps won't overflow u64 until the year 2554.
#[must_use]
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Current instant as a UTC datetime.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
