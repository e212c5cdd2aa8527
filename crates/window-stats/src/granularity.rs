//! The fixed ladder of time granularities rollups are kept at.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StatsError;

/// Minutes in one thirty-day bucket.
const MINUTES_PER_THIRTY_DAY: u64 = 60 * 24 * 30;

/// One of the time resolutions an index keeps buckets for, finest first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Granularity {
    #[serde(rename = "m")]
    Minute,
    #[serde(rename = "h")]
    Hour,
    #[serde(rename = "d")]
    Day,
    #[serde(rename = "td")]
    ThirtyDay,
}

impl Granularity {
    /// All granularities in ascending order of coarseness.
    pub const ALL: [Granularity; 4] = [
        Granularity::Minute,
        Granularity::Hour,
        Granularity::Day,
        Granularity::ThirtyDay,
    ];

    /// The next coarser granularity, or `None` for the terminal level.
    pub fn next(self) -> Option<Granularity> {
        match self {
            Granularity::Minute => Some(Granularity::Hour),
            Granularity::Hour => Some(Granularity::Day),
            Granularity::Day => Some(Granularity::ThirtyDay),
            Granularity::ThirtyDay => None,
        }
    }

    /// Number of buckets of this granularity that make up one bucket of
    /// [`Granularity::next`]. `None` for the terminal level.
    pub fn divisor(self) -> Option<u64> {
        match self {
            Granularity::Minute => Some(60),
            Granularity::Hour => Some(24),
            Granularity::Day => Some(30),
            Granularity::ThirtyDay => None,
        }
    }

    /// Width of one bucket expressed in minute buckets.
    pub fn minutes_per_bucket(self) -> u64 {
        match self {
            Granularity::Minute => 1,
            Granularity::Hour => 60,
            Granularity::Day => 60 * 24,
            Granularity::ThirtyDay => MINUTES_PER_THIRTY_DAY,
        }
    }

    /// Short key used in storage and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Minute => "m",
            Granularity::Hour => "h",
            Granularity::Day => "d",
            Granularity::ThirtyDay => "td",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "m" | "minute" => Ok(Granularity::Minute),
            "h" | "hour" => Ok(Granularity::Hour),
            "d" | "day" => Ok(Granularity::Day),
            "td" | "thirty_day" => Ok(Granularity::ThirtyDay),
            other => Err(StatsError::InvalidInput(format!(
                "unknown granularity: {other}"
            ))),
        }
    }
}
