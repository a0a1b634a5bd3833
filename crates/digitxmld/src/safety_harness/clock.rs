//! Strictly increasing wall-clock timestamps.

use std::sync::{Mutex, PoisonError};

use time::{Duration, OffsetDateTime};

/// Hands out UTC timestamps that never repeat and never go backwards.
///
/// Backups and commits are ordered by these timestamps, so two readings in
/// the same process always differ by at least one microsecond even when the
/// system clock is coarse or steps back.
#[derive(Debug)]
pub struct MonotonicClock {
    last: Mutex<OffsetDateTime>,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            last: Mutex::new(OffsetDateTime::UNIX_EPOCH),
        }
    }
}

impl MonotonicClock {
    /// Returns the next timestamp.
    pub fn tick(&self) -> OffsetDateTime {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = OffsetDateTime::now_utc();
        let now = now.replace_nanosecond(now.microsecond() * 1_000).unwrap_or(now);
        let next = now.max(*last + Duration::microseconds(1));
        *last = next;
        next
    }
}

/// Formats a timestamp for use in file names: `20240131T235959_123456`.
#[must_use]
pub fn file_stamp(timestamp: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}_{:06}",
        timestamp.year(),
        u8::from(timestamp.month()),
        timestamp.day(),
        timestamp.hour(),
        timestamp.minute(),
        timestamp.second(),
        timestamp.microsecond()
    )
}
