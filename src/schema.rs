//! Database schema management for the NGIF dashboard.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `readings` table holding sparse JSONB field documents and the
/// `sensor_fields` table holding per-field summaries. Safe to call on every
/// startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // One row per uploaded observation; `id` order is the series order.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            id          BIGSERIAL   PRIMARY KEY,
            name        TEXT        NOT NULL,
            time        TIMESTAMPTZ NOT NULL,
            fields      JSONB       NOT NULL,
            uploaded_by TEXT,
            upload_id   UUID        NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Latest value/units summary per raw (sensor, field)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_fields (
            name         TEXT NOT NULL,
            field        TEXT NOT NULL,
            units        TEXT,
            last_value   JSONB,
            last_updated TIMESTAMPTZ,
            PRIMARY KEY (name, field)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_name_id
            ON readings (name, id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_name_time
            ON readings (name, time);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
