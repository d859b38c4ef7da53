//! In-process [`ReadingStore`] with the same filter and ordering rules as Postgres.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::ReadingStore;
use crate::error::Result;
use crate::models::{
    FieldMetadataUpdate, NewReading, RawFieldMetadata, ReadingQuery, SensorDocument, SeriesPoint,
};

#[derive(Default)]
pub struct MemoryReadingStore {
    /// Insertion order stands in for the database's serial id.
    readings: Mutex<Vec<NewReading>>,
    sensors: Mutex<BTreeMap<String, BTreeMap<String, RawFieldMetadata>>>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored reading, in insertion order.
    pub async fn readings(&self) -> Vec<NewReading> {
        self.readings.lock().await.clone()
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn sensor_documents(&self) -> Result<Vec<SensorDocument>> {
        // ---
        Ok(self
            .sensors
            .lock()
            .await
            .iter()
            .map(|(name, fields)| SensorDocument {
                name: name.clone(),
                fields: fields.clone(),
            })
            .collect())
    }

    async fn find_readings(&self, query: &ReadingQuery) -> Result<Vec<SeriesPoint>> {
        // ---
        let readings = self.readings.lock().await;
        Ok(readings
            .iter()
            .filter(|r| r.name == query.name)
            .filter(|r| match query.bounds {
                Some((start, end)) => r.time >= start && r.time < end,
                None => true,
            })
            .filter_map(|r| {
                r.fields.get(&query.field).map(|value| SeriesPoint {
                    time: r.time,
                    value: value.clone(),
                })
            })
            .collect())
    }

    async fn latest_reading_time(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .readings
            .lock()
            .await
            .iter()
            .rev()
            .find(|r| r.name == name)
            .map(|r| r.time))
    }

    async fn upsert_field_metadata(
        &self,
        name: &str,
        updates: &[FieldMetadataUpdate],
    ) -> Result<()> {
        // ---
        let mut sensors = self.sensors.lock().await;
        let fields = sensors.entry(name.to_string()).or_default();
        for update in updates {
            let meta = fields.entry(update.field.clone()).or_default();
            if let Some(units) = &update.units {
                meta.units = Some(units.clone());
            }
            if let Some(value) = &update.last_value {
                meta.last_value = Some(value.clone());
            }
            if let Some(time) = update.last_updated {
                meta.last_updated = Some(time);
            }
        }
        Ok(())
    }

    async fn insert_readings(&self, readings: &[NewReading]) -> Result<u64> {
        // ---
        self.readings.lock().await.extend_from_slice(readings);
        Ok(readings.len() as u64)
    }
}
