//! Hierarchical time-window statistics.
//!
//! Measurements for a subject are rolled up into minute, hour, day and
//! thirty-day buckets as they are ingested. Range queries combine the fewest
//! stored buckets across granularities that exactly cover the requested
//! minute range.

pub mod bucketing;
pub mod decompose;
pub mod error;
pub mod granularity;
pub mod index;
pub mod memory;
pub mod storage;
pub mod types;

pub use bucketing::{assign_buckets, BucketSet};
pub use decompose::{decompose, decompose_minutes, Fragment};
pub use error::{Result, StatsError};
pub use granularity::Granularity;
pub use index::WindowStatsIndex;
pub use memory::MemoryStorage;
pub use storage::{SqliteStorage, StatsStorage};
pub use types::{fold_chronological, Measurement, WindowStats};
