//! In-memory storage backend.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use crate::bucketing::BucketSet;
use crate::error::Result;
use crate::granularity::Granularity;
use crate::storage::StatsStorage;
use crate::types::WindowStats;

/// All granularities of one subject, stored together.
#[derive(Debug, Default)]
struct SubjectIndex {
    // Indexed by `Granularity::index`
    buckets: [BTreeMap<u64, WindowStats>; 4],
}

impl SubjectIndex {
    fn granularity(&self, granularity: Granularity) -> &BTreeMap<u64, WindowStats> {
        &self.buckets[granularity.index()]
    }

    fn range(
        &self,
        granularity: Granularity,
        start: u64,
        end: u64,
    ) -> impl Iterator<Item = (&u64, &WindowStats)> + '_ {
        // BTreeMap::range panics on inverted bounds
        let end = end.max(start);
        self.granularity(granularity).range(start..end)
    }
}

/// Sorted in-memory index, keyed by subject.
///
/// One write lock covers the four merges of a measurement, so readers never
/// observe a measurement applied to some granularities but not others.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    subjects: RwLock<HashMap<String, SubjectIndex>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StatsStorage for MemoryStorage {
    async fn merge_measurement(
        &self,
        subject: &str,
        buckets: &BucketSet,
        stats: &WindowStats,
    ) -> Result<()> {
        let mut guard = self.subjects.write().await;
        let index = guard.entry(subject.to_string()).or_default();

        for (granularity, bucket) in buckets.iter() {
            let slot = index.buckets[granularity.index()]
                .entry(bucket)
                .or_insert_with(WindowStats::zero);
            *slot = slot.merge(stats);
        }

        Ok(())
    }

    async fn range_scan(
        &self,
        subject: &str,
        granularity: Granularity,
        start: u64,
        end: u64,
    ) -> Result<Vec<(u64, WindowStats)>> {
        let guard = self.subjects.read().await;
        Ok(guard
            .get(subject)
            .map(|index| {
                index
                    .range(granularity, start, end)
                    .map(|(bucket, stats)| (*bucket, *stats))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count_buckets(
        &self,
        subject: &str,
        granularity: Granularity,
        start: u64,
        end: u64,
    ) -> Result<u64> {
        let guard = self.subjects.read().await;
        Ok(guard
            .get(subject)
            .map(|index| index.range(granularity, start, end).count() as u64)
            .unwrap_or(0))
    }

    async fn get_bucket(
        &self,
        subject: &str,
        granularity: Granularity,
        bucket: u64,
    ) -> Result<Option<WindowStats>> {
        let guard = self.subjects.read().await;
        Ok(guard
            .get(subject)
            .and_then(|index| index.granularity(granularity).get(&bucket))
            .copied())
    }
}
