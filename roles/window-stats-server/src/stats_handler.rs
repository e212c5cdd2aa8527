use std::sync::Arc;
use tracing::{debug, warn};

use window_stats::Measurement;

use crate::db::StatsData;

pub struct StatsHandler {
    db: Arc<StatsData>,
}

impl StatsHandler {
    pub fn new(db: Arc<StatsData>) -> Self {
        Self { db }
    }

    /// Accept one newline-delimited JSON payload, deserialize it into a
    /// `Measurement`, and merge it into the index.
    pub async fn handle_message(&self, data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        let measurement = match serde_json::from_slice::<Measurement>(data) {
            Ok(measurement) => measurement,
            Err(e) => {
                warn!("Failed to parse measurement message: {}", e);
                return Err(e.into());
            }
        };

        debug!(
            "Received measurement: subject={}, value={}, timestamp_millis={}",
            measurement.subject, measurement.value, measurement.timestamp_millis
        );

        if let Err(e) = self.db.ingest(&measurement).await {
            warn!(
                "Rejected measurement for subject {}: {}",
                measurement.subject, e
            );
            return Err(e.into());
        }

        Ok(())
    }
}
