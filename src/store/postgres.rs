//! Postgres-backed [`ReadingStore`].
//!
//! Readings live in `readings` as one JSONB document of sparse fields per row;
//! field summaries live in `sensor_fields`, one row per `(name, field)`.
//! Ordering is by the serial `id`, i.e. insertion order.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use super::{with_timeout, ReadingStore};
use crate::error::Result;
use crate::models::{
    FieldMetadataUpdate, FieldValue, NewReading, RawFieldMetadata, ReadingQuery, SensorDocument,
    SeriesPoint,
};

// ---

#[derive(Clone)]
pub struct PgReadingStore {
    pool: PgPool,
    timeout: Duration,
}

#[derive(sqlx::FromRow)]
struct FieldRow {
    name: String,
    field: String,
    units: Option<String>,
    last_value: Option<Json<FieldValue>>,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct PointRow {
    time: DateTime<Utc>,
    value: Json<FieldValue>,
}

impl PgReadingStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn load_sensor_documents(&self) -> Result<Vec<SensorDocument>> {
        // ---
        let rows: Vec<FieldRow> = sqlx::query_as(
            r#"
            SELECT name, field, units, last_value, last_updated
            FROM sensor_fields
            ORDER BY name, field
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut documents: Vec<SensorDocument> = Vec::new();
        for row in rows {
            let meta = RawFieldMetadata {
                units: row.units,
                last_value: row.last_value.map(|Json(v)| v),
                last_updated: row.last_updated,
            };
            match documents.last_mut() {
                Some(doc) if doc.name == row.name => {
                    doc.fields.insert(row.field, meta);
                }
                _ => {
                    let mut doc = SensorDocument {
                        name: row.name,
                        ..Default::default()
                    };
                    doc.fields.insert(row.field, meta);
                    documents.push(doc);
                }
            }
        }
        Ok(documents)
    }

    async fn query_points(&self, query: &ReadingQuery) -> Result<Vec<SeriesPoint>> {
        // ---
        let (start, end) = match query.bounds {
            Some((start, end)) => (Some(start), Some(end)),
            None => (None, None),
        };

        let rows: Vec<PointRow> = sqlx::query_as(
            r#"
            SELECT time, fields -> $2 AS value
            FROM readings
            WHERE name = $1
              AND jsonb_exists(fields, $2)
              AND ($3::timestamptz IS NULL OR time >= $3)
              AND ($4::timestamptz IS NULL OR time <  $4)
            ORDER BY id ASC
            "#,
        )
        .bind(&query.name)
        .bind(&query.field)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SeriesPoint {
                time: row.time,
                value: row.value.0,
            })
            .collect())
    }

    async fn query_latest_time(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        // ---
        let time: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT time FROM readings
            WHERE name = $1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(time)
    }

    async fn write_field_metadata(&self, name: &str, updates: &[FieldMetadataUpdate]) -> Result<()> {
        // ---
        let mut tx = self.pool.begin().await?;

        for update in updates {
            sqlx::query(
                r#"
                INSERT INTO sensor_fields (name, field, units, last_value, last_updated)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (name, field) DO UPDATE SET
                    units        = COALESCE(EXCLUDED.units, sensor_fields.units),
                    last_value   = COALESCE(EXCLUDED.last_value, sensor_fields.last_value),
                    last_updated = COALESCE(EXCLUDED.last_updated, sensor_fields.last_updated)
                "#,
            )
            .bind(name)
            .bind(&update.field)
            .bind(&update.units)
            .bind(update.last_value.as_ref().map(Json))
            .bind(update.last_updated)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn write_readings(&self, readings: &[NewReading]) -> Result<u64> {
        // ---
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for reading in readings {
            let result = sqlx::query(
                r#"
                INSERT INTO readings (name, time, fields, uploaded_by, upload_id)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&reading.name)
            .bind(reading.time)
            .bind(Json(&reading.fields))
            .bind(&reading.uploaded_by)
            .bind(reading.upload_id)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn sensor_documents(&self) -> Result<Vec<SensorDocument>> {
        with_timeout("sensor_documents", self.timeout, self.load_sensor_documents()).await
    }

    async fn find_readings(&self, query: &ReadingQuery) -> Result<Vec<SeriesPoint>> {
        with_timeout("find_readings", self.timeout, self.query_points(query)).await
    }

    async fn latest_reading_time(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        with_timeout("latest_reading_time", self.timeout, self.query_latest_time(name)).await
    }

    async fn upsert_field_metadata(
        &self,
        name: &str,
        updates: &[FieldMetadataUpdate],
    ) -> Result<()> {
        with_timeout(
            "upsert_field_metadata",
            self.timeout,
            self.write_field_metadata(name, updates),
        )
        .await
    }

    async fn insert_readings(&self, readings: &[NewReading]) -> Result<u64> {
        with_timeout("insert_readings", self.timeout, self.write_readings(readings)).await
    }
}
