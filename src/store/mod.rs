//! Reading store contract.
//!
//! The rest of the crate sees the persistent store only through
//! [`ReadingStore`]: find by filter with projection and insertion-order sort,
//! insert many, and upsert per-field sensor summaries. Readings are sparse, so
//! a field filter is always an existence check on the stored document.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{FieldMetadataUpdate, NewReading, ReadingQuery, SensorDocument, SeriesPoint};

mod memory;
mod postgres;

pub use memory::MemoryReadingStore;
pub use postgres::PgReadingStore;

// ---

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Every sensor's per-field summaries, sorted by sensor name.
    async fn sensor_documents(&self) -> Result<Vec<SensorDocument>>;

    /// Points of `query.field` for `query.name`, ascending by insertion order.
    /// Readings that do not carry the field are skipped.
    async fn find_readings(&self, query: &ReadingQuery) -> Result<Vec<SeriesPoint>>;

    /// Time of the most recently inserted reading for a sensor.
    async fn latest_reading_time(&self, name: &str) -> Result<Option<DateTime<Utc>>>;

    /// Upsert field summaries for a sensor. `None` parts keep the stored value.
    async fn upsert_field_metadata(&self, name: &str, updates: &[FieldMetadataUpdate])
        -> Result<()>;

    /// Append readings in the given order. Returns the number written.
    async fn insert_readings(&self, readings: &[NewReading]) -> Result<u64>;
}

/// Run a store future with a deadline, surfacing [`AppError::StoreTimeout`].
pub(crate) async fn with_timeout<T, F>(op: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    // ---
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("Store operation '{}' exceeded {:?}", op, timeout);
            Err(AppError::StoreTimeout { op, timeout })
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn test_timeout_surfaces_store_timeout() {
        // ---
        let result: Result<()> = with_timeout("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(AppError::StoreTimeout { op: "slow", .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_passes_result_through() {
        // ---
        let result = with_timeout("fast", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
