use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Epoch-millisecond clock that never goes backwards within a process.
///
/// Dispatch timestamps are part of the correlation key for in-flight
/// invocations, so they must be non-decreasing even under wall-clock slew.
/// Two calls within the same millisecond may return the same value; callers
/// that need uniqueness must handle that themselves.
#[derive(Debug, Default)]
pub struct MonotonicMillis {
    last: AtomicI64,
}

impl MonotonicMillis {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    pub fn now_ms(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        let previous = self.last.fetch_max(wall, Ordering::AcqRel);
        wall.max(previous)
    }
}
