//! UUID v7 utilities for time-ordered identifiers.
//!
//! Correlation ids are UUIDv7 (RFC 9562): the first 48 bits embed a Unix
//! millisecond timestamp, so ids generated later sort lexicographically
//! greater and log stores can range-scan by time.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Extract the embedded millisecond timestamp from a UUIDv7.
///
/// Returns `None` for non-v7 uuids.
pub fn extract_timestamp(id: &Uuid) -> Option<DateTime<Utc>> {
    if id.get_version_num() != 7 {
        return None;
    }
    let bytes = id.as_bytes();
    let mut millis: u64 = 0;
    for b in &bytes[..6] {
        millis = (millis << 8) | u64::from(*b);
    }
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
}
