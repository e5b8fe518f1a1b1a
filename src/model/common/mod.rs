//! Types shared between the database, the engine and the API.

pub mod actor;
pub mod ballot;
pub mod election;

use chrono::{DateTime, DurationRound, Utc};

/// The current time, truncated to millisecond precision.
///
/// MongoDB stores datetimes with millisecond precision, so every timestamp the
/// engine writes goes through here to make receipts identical before and after
/// a database round trip.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(chrono::Duration::milliseconds(1))
        .unwrap_or(now)
}
