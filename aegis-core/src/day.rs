//! UTC Day Buckets
//!
//! The reservation ledger rotates its counters at 00:00 UTC by keying each
//! entry with the current `yyyy-mm-dd` bucket. Rollover needs no writes:
//! the new day simply reads a fresh key and the old one expires.

use chrono::{DateTime, Utc};

/// Today's bucket in `yyyy-mm-dd` form.
pub fn utc_day() -> String {
    day_bucket(Utc::now())
}

/// Bucket for an arbitrary instant, mostly for tests and forensics.
pub fn day_bucket(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
