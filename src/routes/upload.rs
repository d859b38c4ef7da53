//! Upload endpoints for logger batches.
//!
//! Both endpoints normalize into [`RawBatch`]es and hand each one to the
//! ingestion normalizer. The client address is stored as provenance.

use std::net::SocketAddr;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, StringRejection},
        ConnectInfo, Path, State,
    },
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info};

use super::AppState;
use crate::error::Result;
use crate::ingest::{ingest, parse};
use crate::models::RawBatch;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/upload/eml", post(upload_json))
        .route("/upload/file/{filename}", post(upload_file))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct UploadResponse {
    pub uploaded: bool,
    pub accepted: usize,
}

async fn ingest_all(state: &AppState, batches: Vec<RawBatch>, origin: &str) -> Result<usize> {
    // ---
    let mut accepted = 0;
    for batch in batches {
        let sensor_id = batch.sensor_id.clone();
        match ingest(state.store.as_ref(), batch, Some(origin)).await {
            Ok(outcome) => accepted += outcome.accepted,
            Err(e) => {
                error!("Ingest failed for sensor {}: {}", sensor_id, e);
                return Err(e);
            }
        }
    }
    Ok(accepted)
}

async fn upload_json(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    payload: std::result::Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<UploadResponse>> {
    // ---
    let Json(payload) = payload?;
    let batches = parse::json_rows(&payload)?;
    if batches.is_empty() {
        info!("POST /upload/eml from {} - empty upload", addr);
        return Ok(Json(UploadResponse {
            uploaded: false,
            accepted: 0,
        }));
    }

    info!(
        "POST /upload/eml from {} - {} sensors",
        addr,
        batches.len()
    );
    let accepted = ingest_all(&state, batches, &addr.ip().to_string()).await?;

    Ok(Json(UploadResponse {
        uploaded: true,
        accepted,
    }))
}

async fn upload_file(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    filename: std::result::Result<Path<String>, PathRejection>,
    State(state): State<AppState>,
    body: std::result::Result<String, StringRejection>,
) -> Result<Json<UploadResponse>> {
    // ---
    let Path(filename) = filename?;
    let body = body?;
    info!("POST /upload/file/{} from {}", filename, addr);

    let batch = parse::delimited(&filename, &body)?;
    if batch.rows.is_empty() {
        return Ok(Json(UploadResponse {
            uploaded: false,
            accepted: 0,
        }));
    }
    let accepted = ingest_all(&state, vec![batch], &addr.ip().to_string()).await?;

    Ok(Json(UploadResponse {
        uploaded: true,
        accepted,
    }))
}
