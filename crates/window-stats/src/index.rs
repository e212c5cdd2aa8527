//! Multi-granularity index: the write path and range queries.

use std::sync::Arc;

use crate::bucketing::{assign_buckets, MAX_MINUTE_BUCKET};
use crate::decompose::decompose_minutes;
use crate::error::{Result, StatsError};
use crate::granularity::Granularity;
use crate::memory::MemoryStorage;
use crate::storage::StatsStorage;
use crate::types::{fold_chronological, WindowStats};

/// Longest accepted subject, in bytes.
pub const MAX_SUBJECT_LEN: usize = 1024;

/// Per-subject time-window statistics kept at every granularity.
///
/// Callers must not issue concurrent [`WindowStatsIndex::ingest`] calls for
/// the same subject, and must submit a subject's measurements in timestamp
/// order for `last` to mean "most recent".
#[derive(Clone)]
pub struct WindowStatsIndex {
    storage: Arc<dyn StatsStorage>,
}

impl WindowStatsIndex {
    pub fn new(storage: Arc<dyn StatsStorage>) -> Self {
        Self { storage }
    }

    /// Index backed by [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Record one measurement in the minute, hour, day and thirty-day bucket
    /// its timestamp falls into.
    pub async fn ingest(&self, subject: &str, value: i32, timestamp_millis: i64) -> Result<()> {
        validate_subject(subject)?;
        let single = WindowStats::single(value);
        let buckets = assign_buckets(timestamp_millis)?;

        tracing::debug!(
            "Ingesting measurement: subject={}, value={}, timestamp_millis={}, minute_bucket={}",
            subject,
            value,
            timestamp_millis,
            buckets.minute
        );

        self.storage
            .merge_measurement(subject, &buckets, &single)
            .await
    }

    /// Aggregate stats over the minute buckets `[start_minute, end_minute)`.
    ///
    /// Reads the coarsest buckets that fit the range and folds them in
    /// chronological order. Returns [`WindowStats::zero`] when no data is
    /// stored in the range.
    pub async fn query(
        &self,
        subject: &str,
        start_minute: u64,
        end_minute: u64,
    ) -> Result<WindowStats> {
        validate_subject(subject)?;
        validate_range(start_minute, end_minute)?;
        if end_minute > MAX_MINUTE_BUCKET + 1 {
            return Err(StatsError::InvalidInput(format!(
                "range end {end_minute} is past the last minute bucket {MAX_MINUTE_BUCKET}"
            )));
        }

        let fragments = decompose_minutes(start_minute, end_minute);
        let mut buckets = Vec::new();

        for fragment in &fragments {
            let scanned = self
                .storage
                .range_scan(subject, fragment.granularity, fragment.start, fragment.end)
                .await?;

            tracing::debug!(
                "Scanned fragment: subject={}, granularity={}, start={}, end={}, buckets={}",
                subject,
                fragment.granularity,
                fragment.start,
                fragment.end,
                scanned.len()
            );

            let width = fragment.granularity.minutes_per_bucket();
            buckets.extend(
                scanned
                    .into_iter()
                    .map(|(bucket, stats)| (bucket * width, stats)),
            );
        }

        let bucket_count = buckets.len();
        let stats = fold_chronological(buckets)?;

        tracing::info!(
            "Query for subject={} over minutes [{}, {}): fragments={}, buckets={}, count={}",
            subject,
            start_minute,
            end_minute,
            fragments.len(),
            bucket_count,
            stats.count
        );

        Ok(stats)
    }

    /// The aggregate stored for one bucket, `None` if nothing was ingested
    /// into it.
    pub async fn point_query(
        &self,
        subject: &str,
        granularity: Granularity,
        bucket: u64,
    ) -> Result<Option<WindowStats>> {
        validate_subject(subject)?;
        self.storage.get_bucket(subject, granularity, bucket).await
    }

    /// Stored buckets of one granularity in `[start, end)`, ascending.
    pub async fn range(
        &self,
        subject: &str,
        granularity: Granularity,
        start: u64,
        end: u64,
    ) -> Result<Vec<(u64, WindowStats)>> {
        validate_subject(subject)?;
        validate_range(start, end)?;
        self.storage.range_scan(subject, granularity, start, end).await
    }

    /// Number of stored buckets of one granularity in `[start, end)`.
    pub async fn count_buckets(
        &self,
        subject: &str,
        granularity: Granularity,
        start: u64,
        end: u64,
    ) -> Result<u64> {
        validate_subject(subject)?;
        validate_range(start, end)?;
        self.storage
            .count_buckets(subject, granularity, start, end)
            .await
    }
}

fn validate_subject(subject: &str) -> Result<()> {
    if subject.is_empty() {
        return Err(StatsError::InvalidInput("empty subject".to_string()));
    }
    if subject.len() > MAX_SUBJECT_LEN {
        return Err(StatsError::InvalidInput(format!(
            "subject longer than {MAX_SUBJECT_LEN} bytes"
        )));
    }
    if subject.chars().any(char::is_control) {
        return Err(StatsError::InvalidInput(
            "subject contains control characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_range(start: u64, end: u64) -> Result<()> {
    if start > end {
        return Err(StatsError::InvalidInput(format!(
            "range start {start} is after end {end}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A timestamp inside the given minute bucket.
    fn minute(bucket: i64) -> i64 {
        bucket * 60_000 + (bucket * 7_919) % 60_000
    }

    async fn seeded_index() -> WindowStatsIndex {
        let index = WindowStatsIndex::in_memory();
        let data = [
            (10, minute(3)),
            (20, minute(3)),
            (15, minute(10)),
            (18, minute(10)),
            (33, minute(10)),
            (20, minute(65)),
            (30, minute(65)),
            (100, minute(60 * 24)),
            (100, minute(60 * 24 + 8)),
            (50, minute(60 * 48 + 122)),
        ];
        for (value, ts) in data {
            index.ingest("foo.com", value, ts).await.unwrap();
        }
        index
    }

    #[tokio::test]
    async fn test_point_query_single_bucket() {
        let index = seeded_index().await;
        let stats = index
            .point_query("foo.com", Granularity::Minute, 3)
            .await
            .unwrap();
        assert_eq!(
            stats,
            Some(WindowStats {
                count: 2,
                sum: 30,
                last: Some(20),
                min: Some(10),
                max: Some(20),
            })
        );
    }

    #[tokio::test]
    async fn test_range_of_minute_buckets() {
        let index = seeded_index().await;
        let range = index
            .range("foo.com", Granularity::Minute, 3, 11)
            .await
            .unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].0, 3);
        assert_eq!(range[1].0, 10);
        assert_eq!(
            range[1].1,
            WindowStats {
                count: 3,
                sum: 66,
                last: Some(33),
                min: Some(15),
                max: Some(33),
            }
        );
    }

    #[tokio::test]
    async fn test_count_minute_buckets() {
        let index = seeded_index().await;
        let count = index
            .count_buckets("foo.com", Granularity::Minute, 0, 60 * 72)
            .await
            .unwrap();
        assert_eq!(count, 6);
    }

    #[tokio::test]
    async fn test_query_large_range() {
        let index = seeded_index().await;
        let stats = index.query("foo.com", 0, 60 * 72).await.unwrap();
        assert_eq!(
            stats,
            WindowStats {
                count: 10,
                sum: 396,
                last: Some(50),
                min: Some(10),
                max: Some(100),
            }
        );
    }

    #[tokio::test]
    async fn test_day_rollup() {
        let index = seeded_index().await;
        let stats = index
            .point_query("foo.com", Granularity::Day, 0)
            .await
            .unwrap();
        assert_eq!(
            stats,
            Some(WindowStats {
                count: 7,
                sum: 146,
                last: Some(30),
                min: Some(10),
                max: Some(33),
            })
        );
    }

    #[tokio::test]
    async fn test_query_last_follows_time_across_granularities() {
        // Decomposition yields the hour fragment before the minute head and
        // tail; the fold still has to follow time.
        let index = WindowStatsIndex::in_memory();
        index.ingest("foo.com", 1, minute(59)).await.unwrap();
        index.ingest("foo.com", 2, minute(60)).await.unwrap();
        index.ingest("foo.com", 3, minute(121)).await.unwrap();

        let stats = index.query("foo.com", 59, 122).await.unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.last, Some(3));

        let stats = index.query("foo.com", 59, 120).await.unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.last, Some(2));
    }

    #[tokio::test]
    async fn test_query_without_data_is_zero() {
        let index = WindowStatsIndex::in_memory();
        let stats = index.query("foo.com", 0, 100_000).await.unwrap();
        assert_eq!(
            stats,
            WindowStats {
                count: 0,
                sum: 0,
                last: None,
                min: None,
                max: None,
            }
        );
    }

    #[tokio::test]
    async fn test_query_excludes_end_bucket() {
        let index = seeded_index().await;
        let stats = index.query("foo.com", 3, 10).await.unwrap();
        assert_eq!(stats.count, 2);
        let stats = index.query("foo.com", 3, 3).await.unwrap();
        assert_eq!(stats, WindowStats::zero());
    }

    #[tokio::test]
    async fn test_range_past_last_minute_bucket() {
        let index = WindowStatsIndex::in_memory();
        index.ingest("foo.com", 9, i64::MAX).await.unwrap();

        assert!(matches!(
            index.query("foo.com", u64::MAX - 10, u64::MAX).await,
            Err(StatsError::InvalidInput(_))
        ));
        assert!(matches!(
            index.query("foo.com", 0, MAX_MINUTE_BUCKET + 2).await,
            Err(StatsError::InvalidInput(_))
        ));

        let stats = index
            .query("foo.com", MAX_MINUTE_BUCKET - 100_000, MAX_MINUTE_BUCKET + 1)
            .await
            .unwrap();
        assert_eq!(stats, WindowStats::single(9));
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let index = WindowStatsIndex::in_memory();

        assert!(matches!(
            index.ingest("foo.com", 1, -5).await,
            Err(StatsError::InvalidInput(_))
        ));
        assert!(matches!(
            index.ingest("", 1, 0).await,
            Err(StatsError::InvalidInput(_))
        ));
        assert!(matches!(
            index.ingest("foo\n.com", 1, 0).await,
            Err(StatsError::InvalidInput(_))
        ));
        let long_subject = "x".repeat(MAX_SUBJECT_LEN + 1);
        assert!(index.ingest(&long_subject, 1, 0).await.is_err());
        assert!(matches!(
            index.query("foo.com", 10, 5).await,
            Err(StatsError::InvalidInput(_))
        ));

        // Nothing was written by the rejected calls
        assert_eq!(
            index.query("foo.com", 0, 1_000).await.unwrap(),
            WindowStats::zero()
        );
    }

    #[tokio::test]
    async fn test_subjects_do_not_mix() {
        let index = WindowStatsIndex::in_memory();
        index.ingest("a.com", 5, minute(1)).await.unwrap();
        index.ingest("b.com", 7, minute(1)).await.unwrap();

        let a = index.query("a.com", 0, 60).await.unwrap();
        let b = index.query("b.com", 0, 60).await.unwrap();
        assert_eq!(a, WindowStats::single(5));
        assert_eq!(b, WindowStats::single(7));
    }
}
