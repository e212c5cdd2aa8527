use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use window_stats::{Measurement, MemoryStorage, SqliteStorage, WindowStatsIndex};

use crate::config::StorageBackend;

/// Shared state of the service: the index plus ingest counters for the
/// health endpoint.
pub struct StatsData {
    index: WindowStatsIndex,
    ingested: AtomicU64,
    rejected: AtomicU64,
}

impl StatsData {
    pub fn new(index: WindowStatsIndex) -> Self {
        Self {
            index,
            ingested: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Open the index on the configured storage backend.
    pub async fn open(backend: &StorageBackend) -> Result<Self, Box<dyn std::error::Error>> {
        let index = match backend {
            StorageBackend::Memory => {
                tracing::info!("Using in-memory window stats storage");
                WindowStatsIndex::new(Arc::new(MemoryStorage::new()))
            }
            StorageBackend::Sqlite { db_path } => {
                tracing::info!("Using SQLite window stats storage at {}", db_path);
                WindowStatsIndex::new(Arc::new(SqliteStorage::new(db_path).await?))
            }
        };
        Ok(Self::new(index))
    }

    pub fn index(&self) -> &WindowStatsIndex {
        &self.index
    }

    /// Apply one measurement to the index, counting the outcome.
    pub async fn ingest(&self, measurement: &Measurement) -> window_stats::Result<()> {
        let result = self
            .index
            .ingest(
                &measurement.subject,
                measurement.value,
                measurement.timestamp_millis,
            )
            .await;

        match &result {
            Ok(()) => self.ingested.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.rejected.fetch_add(1, Ordering::Relaxed),
        };

        result
    }

    /// Measurements applied since startup.
    pub fn ingested_count(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }

    /// Measurements rejected by the index since startup.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}
