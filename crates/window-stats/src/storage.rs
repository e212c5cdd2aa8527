//! Storage backends for bucketed window stats.

use crate::bucketing::BucketSet;
use crate::error::Result;
use crate::granularity::Granularity;
use crate::types::WindowStats;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// Storage abstraction for the multi-granularity index.
///
/// Implementations keep every granularity of one subject together, keep
/// buckets of one `(subject, granularity)` sorted, and apply the merges of
/// one measurement atomically.
#[async_trait::async_trait]
pub trait StatsStorage: Send + Sync {
    /// Merge `stats` into the bucket of every granularity in `buckets`.
    ///
    /// Either all four merges are applied or none is. `stats` is always the
    /// right-hand (later) operand of [`WindowStats::merge`].
    async fn merge_measurement(
        &self,
        subject: &str,
        buckets: &BucketSet,
        stats: &WindowStats,
    ) -> Result<()>;

    /// Stored buckets with `start <= bucket < end`, in ascending order.
    async fn range_scan(
        &self,
        subject: &str,
        granularity: Granularity,
        start: u64,
        end: u64,
    ) -> Result<Vec<(u64, WindowStats)>>;

    /// Number of stored buckets with `start <= bucket < end`.
    async fn count_buckets(
        &self,
        subject: &str,
        granularity: Granularity,
        start: u64,
        end: u64,
    ) -> Result<u64>;

    /// The aggregate stored for a single bucket, if any.
    async fn get_bucket(
        &self,
        subject: &str,
        granularity: Granularity,
        bucket: u64,
    ) -> Result<Option<WindowStats>>;
}

/// Merge rule of [`WindowStats::merge`] expressed as an upsert.
const MERGE_BUCKET_SQL: &str = r#"
    INSERT INTO window_stats
    (subject, granularity, bucket, count_value, sum_value, last_value, min_value, max_value)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(subject, granularity, bucket) DO UPDATE SET
        count_value = window_stats.count_value + excluded.count_value,
        sum_value = window_stats.sum_value + excluded.sum_value,
        last_value = CASE
            WHEN excluded.count_value > 0 THEN excluded.last_value
            ELSE window_stats.last_value
        END,
        min_value = CASE
            WHEN window_stats.min_value IS NULL THEN excluded.min_value
            WHEN excluded.min_value IS NULL THEN window_stats.min_value
            ELSE MIN(window_stats.min_value, excluded.min_value)
        END,
        max_value = CASE
            WHEN window_stats.max_value IS NULL THEN excluded.max_value
            WHEN excluded.max_value IS NULL THEN window_stats.max_value
            ELSE MAX(window_stats.max_value, excluded.max_value)
        END
"#;

/// SQLite-backed storage implementation.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance.
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Create parent directories if they don't exist
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let connection_options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connection_options)
            .await?;

        let storage = Self { pool };
        storage.init_schema().await?;

        tracing::info!("Opened window stats database at {}", db_path.display());

        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        // Subject leads the primary key so every granularity of one subject
        // lives in one contiguous key range.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS window_stats (
                subject TEXT NOT NULL,
                granularity TEXT NOT NULL,
                bucket INTEGER NOT NULL,
                count_value INTEGER NOT NULL CHECK (typeof(count_value) = 'integer'),
                sum_value INTEGER NOT NULL CHECK (typeof(sum_value) = 'integer'),
                last_value INTEGER,
                min_value INTEGER,
                max_value INTEGER,

                PRIMARY KEY (subject, granularity, bucket)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_bucket(row: &SqliteRow) -> Result<(u64, WindowStats)> {
        let bucket = row.try_get::<i64, _>("bucket")? as u64;
        let stats = WindowStats {
            count: row.try_get::<i64, _>("count_value")? as u64,
            sum: row.try_get::<i64, _>("sum_value")?,
            last: row.try_get::<Option<i32>, _>("last_value")?,
            min: row.try_get::<Option<i32>, _>("min_value")?,
            max: row.try_get::<Option<i32>, _>("max_value")?,
        };
        Ok((bucket, stats))
    }
}

/// Bucket indices are stored as SQLite integers; anything past `i64::MAX`
/// can only appear as an open range end.
fn sql_bucket(bucket: u64) -> i64 {
    i64::try_from(bucket).unwrap_or(i64::MAX)
}

#[async_trait::async_trait]
impl StatsStorage for SqliteStorage {
    async fn merge_measurement(
        &self,
        subject: &str,
        buckets: &BucketSet,
        stats: &WindowStats,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (granularity, bucket) in buckets.iter() {
            sqlx::query(MERGE_BUCKET_SQL)
                .bind(subject)
                .bind(granularity.as_str())
                .bind(sql_bucket(bucket))
                .bind(stats.count as i64)
                .bind(stats.sum)
                .bind(stats.last)
                .bind(stats.min)
                .bind(stats.max)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "Merged measurement into SQLite buckets: subject={}, minute={}, count={}",
            subject,
            buckets.minute,
            stats.count
        );

        Ok(())
    }

    async fn range_scan(
        &self,
        subject: &str,
        granularity: Granularity,
        start: u64,
        end: u64,
    ) -> Result<Vec<(u64, WindowStats)>> {
        let rows = sqlx::query(
            r#"
            SELECT bucket, count_value, sum_value, last_value, min_value, max_value
            FROM window_stats
            WHERE subject = ? AND granularity = ? AND bucket >= ? AND bucket < ?
            ORDER BY bucket ASC
            "#,
        )
        .bind(subject)
        .bind(granularity.as_str())
        .bind(sql_bucket(start))
        .bind(sql_bucket(end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_bucket).collect()
    }

    async fn count_buckets(
        &self,
        subject: &str,
        granularity: Granularity,
        start: u64,
        end: u64,
    ) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM window_stats
            WHERE subject = ? AND granularity = ? AND bucket >= ? AND bucket < ?
            "#,
        )
        .bind(subject)
        .bind(granularity.as_str())
        .bind(sql_bucket(start))
        .bind(sql_bucket(end))
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn get_bucket(
        &self,
        subject: &str,
        granularity: Granularity,
        bucket: u64,
    ) -> Result<Option<WindowStats>> {
        let row = sqlx::query(
            r#"
            SELECT bucket, count_value, sum_value, last_value, min_value, max_value
            FROM window_stats
            WHERE subject = ? AND granularity = ? AND bucket = ?
            "#,
        )
        .bind(subject)
        .bind(granularity.as_str())
        .bind(sql_bucket(bucket))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_bucket(&row)?.1)),
            None => Ok(None),
        }
    }
}
