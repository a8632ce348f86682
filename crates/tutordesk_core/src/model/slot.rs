//! Time bucket math.
//!
//! Buckets are derived, never persisted: fixed-width windows laid out from
//! the opening time of the operating window.

use crate::config::CoreConfig;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// One fixed-width window on a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeBucket {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeBucket {
    /// Bucket of configured width starting at `start` on `day`.
    pub fn starting_at(config: &CoreConfig, day: NaiveDate, start: NaiveTime) -> Self {
        let start = day.and_time(start);
        Self {
            start,
            end: start + config.bucket_width(),
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn start_time(&self) -> NaiveTime {
        self.start.time()
    }

    /// Half-open overlap test against `[from, to)`.
    pub fn overlaps(&self, from: NaiveDateTime, to: NaiveDateTime) -> bool {
        from < self.end && to > self.start
    }
}

/// Occupancy snapshot for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotOccupancy {
    pub bucket: TimeBucket,
    pub occupancy: usize,
    pub capacity: usize,
}

impl SlotOccupancy {
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.occupancy)
    }

    pub fn is_full(&self) -> bool {
        self.occupancy >= self.capacity
    }
}

/// All buckets of the operating window on `day`, in chronological order.
pub fn buckets_for_day(config: &CoreConfig, day: NaiveDate) -> Vec<TimeBucket> {
    let closing = day.and_time(config.closing_time);
    let mut buckets = Vec::new();
    let mut cursor = day.and_time(config.opening_time);
    while cursor < closing {
        let end = cursor + config.bucket_width();
        buckets.push(TimeBucket { start: cursor, end });
        cursor = end;
    }
    buckets
}

/// Buckets of the operating window overlapped by `[start, end)`.
pub fn overlapped_buckets(
    config: &CoreConfig,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Vec<TimeBucket> {
    buckets_for_day(config, start.date())
        .into_iter()
        .filter(|bucket| bucket.overlaps(start, end))
        .collect()
}
