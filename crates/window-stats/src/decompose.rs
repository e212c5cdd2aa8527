//! Range decomposition across granularities.
//!
//! A query over a range of minute buckets is answered by reading the coarsest
//! buckets that fit entirely inside the range and only falling back to finer
//! buckets for the unaligned head and tail. For example, querying from minute
//! 58 of hour 6 through minute 3 of hour 20 of the same day reads:
//!
//! - minute buckets from minute 58 of hour 6 up to hour 7
//! - hour buckets 7 through 19
//! - minute buckets from the start of hour 20 up to minute 3 of hour 20

use crate::granularity::Granularity;

/// A `[start, end)` range of buckets at a single granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fragment {
    pub granularity: Granularity,
    pub start: u64,
    pub end: u64,
}

impl Fragment {
    pub fn new(granularity: Granularity, start: u64, end: u64) -> Self {
        Self {
            granularity,
            start,
            end,
        }
    }

    /// The `[start, end)` range of minute buckets this fragment covers,
    /// saturating at `u64::MAX`.
    pub fn minute_span(&self) -> (u64, u64) {
        let width = self.granularity.minutes_per_bucket();
        (self.start.saturating_mul(width), self.end.saturating_mul(width))
    }
}

/// Split `[start, end)` at `granularity` into fragments that use coarser
/// granularities wherever the range is aligned to their boundaries.
///
/// The fragments do not overlap and together cover exactly the input range.
/// At most a head and a tail fragment are produced per level, and recursion
/// stops at [`Granularity::ThirtyDay`]. Fragments come out coarse interior
/// first, not in chronological order.
pub fn decompose(granularity: Granularity, start: u64, end: u64) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    decompose_into(granularity, start, end, &mut fragments);
    fragments
}

fn decompose_into(granularity: Granularity, start: u64, end: u64, out: &mut Vec<Fragment>) {
    let (next, divisor) = match (granularity.next(), granularity.divisor()) {
        (Some(next), Some(divisor)) => (next, divisor),
        _ => {
            out.push(Fragment::new(granularity, start, end));
            return;
        }
    };

    let next_start = start.div_ceil(divisor);
    let next_end = end / divisor;
    // Past u64::MAX there is no aligned start inside the range.
    let aligned_start = next_start.saturating_mul(divisor);
    let aligned_end = next_end * divisor;

    if next_end > next_start {
        decompose_into(next, next_start, next_end, out);
    }

    if aligned_start >= aligned_end {
        out.push(Fragment::new(granularity, start, end));
    } else {
        if aligned_start > start {
            out.push(Fragment::new(granularity, start, aligned_start));
        }
        if end > aligned_end {
            out.push(Fragment::new(granularity, aligned_end, end));
        }
    }
}

/// Decompose a range of minute buckets and order the fragments by the first
/// minute they cover, which is the order their buckets must be folded in.
pub fn decompose_minutes(start: u64, end: u64) -> Vec<Fragment> {
    let mut fragments = decompose(Granularity::Minute, start, end);
    fragments.sort_by_key(|f| f.minute_span().0);
    fragments
}
