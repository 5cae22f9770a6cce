//! Wall-clock timestamps stamped onto readings and connection records.

use chrono::{DateTime, Utc};

/// UTC timestamp used for `received_at`, `connected_at`, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}
