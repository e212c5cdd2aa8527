//! Measurement and aggregate types for the window stats index.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatsError};

/// A single measurement for a subject, e.g. the render latency of one URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Measurement {
    /// Entity the time series is kept for
    pub subject: String,

    /// Measured value
    pub value: i32,

    /// Unix timestamp in milliseconds
    pub timestamp_millis: i64,
}

impl Measurement {
    pub fn new(subject: impl Into<String>, value: i32, timestamp_millis: i64) -> Self {
        Self {
            subject: subject.into(),
            value,
            timestamp_millis,
        }
    }
}

/// Summary of zero or more measurements that fell into the same window.
///
/// The default value is the identity of [`WindowStats::merge`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowStats {
    /// Number of measurements summarized
    pub count: u64,

    /// Sum of all measured values
    pub sum: i64,

    /// Value of the most recently merged measurement
    pub last: Option<i32>,

    pub min: Option<i32>,

    pub max: Option<i32>,
}

impl WindowStats {
    /// The identity aggregate.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Aggregate of exactly one measurement.
    pub fn single(value: i32) -> Self {
        Self {
            count: 1,
            sum: value as i64,
            last: Some(value),
            min: Some(value),
            max: Some(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arithmetic mean of the summarized values, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum as f64 / self.count as f64)
        }
    }

    /// Combine `self` with an aggregate covering a later window.
    ///
    /// `later` must summarize measurements that are not older than the ones in
    /// `self`: its `last` replaces ours whenever it is non-empty. The merge is
    /// associative, and [`WindowStats::zero`] is an identity on either side for
    /// `count`, `sum`, `min` and `max`, but it is not commutative in `last`.
    ///
    /// # Panics
    ///
    /// Panics if `count` or `sum` overflows.
    pub fn merge(&self, later: &WindowStats) -> WindowStats {
        WindowStats {
            count: self
                .count
                .checked_add(later.count)
                .expect("window stats count overflow"),
            sum: self
                .sum
                .checked_add(later.sum)
                .expect("window stats sum overflow"),
            last: if later.count > 0 { later.last } else { self.last },
            min: combine_present(self.min, later.min, i32::min),
            max: combine_present(self.max, later.max, i32::max),
        }
    }
}

fn combine_present(a: Option<i32>, b: Option<i32>, pick: fn(i32, i32) -> i32) -> Option<i32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Fold aggregates that are keyed by the first minute bucket they cover.
///
/// Items must arrive in non-decreasing minute order so that the `last` field
/// of the result is the temporally most recent value. An item that starts
/// before its predecessor is rejected with [`StatsError::OutOfOrder`].
pub fn fold_chronological<I>(items: I) -> Result<WindowStats>
where
    I: IntoIterator<Item = (u64, WindowStats)>,
{
    let mut acc = WindowStats::zero();
    let mut previous: Option<u64> = None;

    for (minute_start, stats) in items {
        if let Some(prev) = previous {
            if minute_start < prev {
                return Err(StatsError::OutOfOrder {
                    previous: prev,
                    next: minute_start,
                });
            }
        }
        previous = Some(minute_start);
        acc = acc.merge(&stats);
    }

    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single() {
        let s = WindowStats::single(42);
        assert_eq!(s.count, 1);
        assert_eq!(s.sum, 42);
        assert_eq!(s.last, Some(42));
        assert_eq!(s.min, Some(42));
        assert_eq!(s.max, Some(42));
    }

    #[test]
    fn test_merge_two_singles() {
        let merged = WindowStats::single(10).merge(&WindowStats::single(20));
        assert_eq!(
            merged,
            WindowStats {
                count: 2,
                sum: 30,
                last: Some(20),
                min: Some(10),
                max: Some(20),
            }
        );
    }

    #[test]
    fn test_zero_is_identity() {
        let x = WindowStats::single(7).merge(&WindowStats::single(-3));
        assert_eq!(WindowStats::zero().merge(&x), x);
        assert_eq!(x.merge(&WindowStats::zero()), x);
    }

    #[test]
    fn test_empty_later_keeps_last() {
        let x = WindowStats::single(5);
        assert_eq!(x.merge(&WindowStats::zero()).last, Some(5));
    }

    #[test]
    fn test_merge_not_commutative_in_last() {
        let a = WindowStats::single(1);
        let b = WindowStats::single(2);
        let ab = a.merge(&b);
        let ba = b.merge(&a);
        assert_eq!(ab.last, Some(2));
        assert_eq!(ba.last, Some(1));
        // Everything except last agrees
        assert_eq!((ab.count, ab.sum, ab.min, ab.max), (ba.count, ba.sum, ba.min, ba.max));
    }

    #[test]
    fn test_sum_exceeds_value_range() {
        let mut acc = WindowStats::zero();
        for _ in 0..4 {
            acc = acc.merge(&WindowStats::single(i32::MAX));
        }
        assert_eq!(acc.sum, 4 * i32::MAX as i64);
    }

    #[test]
    #[should_panic(expected = "sum overflow")]
    fn test_sum_overflow_panics() {
        let huge = WindowStats {
            count: 1,
            sum: i64::MAX,
            last: Some(1),
            min: Some(1),
            max: Some(1),
        };
        let _ = huge.merge(&WindowStats::single(1));
    }

    #[test]
    fn test_mean() {
        assert_eq!(WindowStats::zero().mean(), None);
        let s = WindowStats::single(10).merge(&WindowStats::single(20));
        assert_eq!(s.mean(), Some(15.0));
    }

    #[test]
    fn test_fold_chronological() {
        let folded = fold_chronological(vec![
            (0, WindowStats::single(3)),
            (60, WindowStats::single(9)),
            (60, WindowStats::single(4)),
        ])
        .unwrap();
        assert_eq!(folded.count, 3);
        assert_eq!(folded.last, Some(4));
        assert_eq!(folded.min, Some(3));
        assert_eq!(folded.max, Some(9));
    }

    #[test]
    fn test_fold_rejects_out_of_order() {
        let result = fold_chronological(vec![
            (120, WindowStats::single(1)),
            (60, WindowStats::single(2)),
        ]);
        assert!(matches!(
            result,
            Err(StatsError::OutOfOrder {
                previous: 120,
                next: 60
            })
        ));
    }

    #[test]
    fn test_fold_empty_is_zero() {
        assert_eq!(fold_chronological(Vec::new()).unwrap(), WindowStats::zero());
    }

    #[test]
    fn test_measurement_serialization() {
        let m = Measurement::new("foo.com", 10, 180_000);
        let json = serde_json::to_string(&m).unwrap();
        let deserialized: Measurement = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, m);
        assert!(json.contains("timestamp_millis"));
    }
}
