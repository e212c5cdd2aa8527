//! Bucket assignment for every granularity of the index.
//!
//! A timestamp maps to exactly one bucket per granularity. Minute buckets are
//! derived from the timestamp directly and every coarser bucket is derived
//! from the next finer one by integer division, so all four indices are
//! monotonic in the timestamp.
//!
//! # Examples
//!
//! ```ignore
//! use window_stats::bucketing::assign_buckets;
//!
//! // 3 days, 2 hours and 5 minutes after the epoch
//! let buckets = assign_buckets(((3 * 24 + 2) * 60 + 5) * 60_000).unwrap();
//! assert_eq!(buckets.minute, 4445);
//! assert_eq!(buckets.hour, 74);
//! assert_eq!(buckets.day, 3);
//! assert_eq!(buckets.thirty_day, 0);
//! ```

use crate::error::{Result, StatsError};
use crate::granularity::Granularity;

/// Milliseconds in one minute bucket.
pub const MILLIS_PER_MINUTE: i64 = 60_000;

/// Minute bucket of the largest representable timestamp.
pub const MAX_MINUTE_BUCKET: u64 = (i64::MAX / MILLIS_PER_MINUTE) as u64;

/// Bucket indices of one timestamp at every granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSet {
    pub minute: u64,
    pub hour: u64,
    pub day: u64,
    pub thirty_day: u64,
}

impl BucketSet {
    /// Bucket index at the given granularity.
    pub fn get(&self, granularity: Granularity) -> u64 {
        match granularity {
            Granularity::Minute => self.minute,
            Granularity::Hour => self.hour,
            Granularity::Day => self.day,
            Granularity::ThirtyDay => self.thirty_day,
        }
    }

    /// `(granularity, bucket)` pairs, finest first.
    pub fn iter(&self) -> impl Iterator<Item = (Granularity, u64)> + '_ {
        Granularity::ALL.into_iter().map(move |g| (g, self.get(g)))
    }
}

/// Minute bucket of a timestamp in Unix milliseconds.
pub fn minute_bucket(timestamp_millis: i64) -> Result<u64> {
    if timestamp_millis < 0 {
        return Err(StatsError::InvalidInput(format!(
            "negative timestamp: {timestamp_millis}"
        )));
    }
    Ok((timestamp_millis / MILLIS_PER_MINUTE) as u64)
}

/// Compute the bucket of `timestamp_millis` at every granularity.
///
/// Rejects negative timestamps with [`StatsError::InvalidInput`].
pub fn assign_buckets(timestamp_millis: i64) -> Result<BucketSet> {
    let minute = minute_bucket(timestamp_millis)?;
    let hour = minute / 60;
    let day = hour / 24;
    let thirty_day = day / 30;

    Ok(BucketSet {
        minute,
        hour,
        day,
        thirty_day,
    })
}
