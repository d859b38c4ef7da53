//! Ingestion normalizer.
//!
//! Takes one parsed [`RawBatch`] per sensor, drops everything not newer than
//! the sensor's latest stored reading, refreshes the per-field summaries and
//! appends the remaining rows.
//!
//! # Consistency
//!
//! Summary upsert and row insert are two separate store writes with no
//! transaction spanning both. A failure between them leaves summaries ahead
//! of (or behind) the stored rows until the next accepted upload; uploads stay
//! available rather than strictly atomic. Writes are never retried here: the
//! recency check makes re-uploading the same file safe instead.
//!
//! The recency check is a read followed by a write. Two concurrent uploads for
//! the same sensor can both pass it and store overlapping rows, so callers
//! expecting that must serialize uploads per sensor. Different sensors are
//! independent.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{FieldMetadataUpdate, FieldValue, IngestRow, NewReading, RawBatch};
use crate::store::ReadingStore;

pub mod parse;

// ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub sensor_id: String,
    pub accepted: usize,
}

/// Ingest one sensor's batch. `uploaded_by` is stored with every new row.
pub async fn ingest(
    store: &dyn ReadingStore,
    batch: RawBatch,
    uploaded_by: Option<&str>,
) -> Result<IngestOutcome> {
    // ---
    let RawBatch {
        sensor_id,
        rows,
        units,
    } = batch;

    if sensor_id.trim().is_empty() {
        return Err(AppError::validation("upload has no sensor identifier"));
    }

    let received = rows.len();
    let latest = store.latest_reading_time(&sensor_id).await?;

    let mut retained: Vec<IngestRow> = match latest {
        Some(latest) => rows.into_iter().filter(|r| r.time > latest).collect(),
        None => rows,
    };

    if retained.is_empty() {
        tracing::info!(
            "Ingest {}: 0 of {} rows newer than {:?}",
            sensor_id,
            received,
            latest
        );
        return Ok(IngestOutcome {
            sensor_id,
            accepted: 0,
        });
    }

    let updates = field_updates(&retained, &units);
    store.upsert_field_metadata(&sensor_id, &updates).await?;

    // Insert in time order so insertion order and time order agree.
    retained.sort_by_key(|r| r.time);

    let upload_id = Uuid::new_v4();
    let readings: Vec<NewReading> = retained
        .into_iter()
        .map(|row| NewReading {
            name: sensor_id.clone(),
            time: row.time,
            fields: row.values,
            uploaded_by: uploaded_by.map(str::to_string),
            upload_id,
        })
        .collect();

    let written = store.insert_readings(&readings).await?;

    tracing::info!(
        "Ingest {}: accepted {} of {} rows ({} fields updated, upload {})",
        sensor_id,
        written,
        received,
        updates.len(),
        upload_id
    );

    Ok(IngestOutcome {
        sensor_id,
        accepted: readings.len(),
    })
}

/// Latest non-null observation per field, by timestamp rather than row order.
///
/// On equal timestamps the first row wins. Fields that only announce units
/// still get an update carrying those units.
pub fn field_updates(
    rows: &[IngestRow],
    units: &BTreeMap<String, String>,
) -> Vec<FieldMetadataUpdate> {
    // ---
    let mut latest: BTreeMap<&str, (DateTime<Utc>, &FieldValue)> = BTreeMap::new();
    for row in rows {
        for (field, value) in &row.values {
            match latest.get(field.as_str()) {
                Some((time, _)) if *time >= row.time => {}
                _ => {
                    latest.insert(field.as_str(), (row.time, value));
                }
            }
        }
    }

    let mut fields: Vec<&str> = latest.keys().copied().collect();
    fields.extend(units.keys().map(String::as_str).filter(|f| !latest.contains_key(f)));
    fields.sort_unstable();

    fields
        .into_iter()
        .map(|field| {
            let observed = latest.get(field);
            FieldMetadataUpdate {
                field: field.to_string(),
                units: units.get(field).cloned(),
                last_value: observed.map(|(_, v)| (*v).clone()),
                last_updated: observed.map(|(t, _)| *t),
            }
        })
        .collect()
}
