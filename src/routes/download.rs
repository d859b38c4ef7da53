//! CSV download endpoints.

use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::info;

use super::AppState;
use crate::error::Result;
use crate::export::{metadata_csv, series_csv, series_filename, METADATA_FILENAME};
use crate::series::{series_for_field, TimeWindow};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/download/{name}/{field}/{start_date}/{end_date}", get(download))
        .route(
            "/download/{name}/{field}/{start_date}/{end_date}/smooth",
            get(download_smoothed),
        )
        .route("/download-metadata", get(download_metadata))
}

#[derive(Debug, Deserialize)]
pub struct DownloadPath {
    name: String,
    field: String,
    start_date: String,
    end_date: String,
}

/// Attachment response. Header values must be visible ASCII, so anything
/// else in the filename is replaced.
fn csv_attachment(filename: &str, body: String) -> Response {
    // ---
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{safe}\""),
            ),
        ],
        body,
    )
        .into_response()
}

type PathParams = std::result::Result<Path<DownloadPath>, PathRejection>;

async fn download(path: PathParams, State(state): State<AppState>) -> Result<Response> {
    let Path(path) = path?;
    export(path, state, false).await
}

async fn download_smoothed(path: PathParams, State(state): State<AppState>) -> Result<Response> {
    let Path(path) = path?;
    export(path, state, true).await
}

async fn export(path: DownloadPath, state: AppState, smooth: bool) -> Result<Response> {
    // ---
    info!("GET /download {:?} smooth={}", path, smooth);

    let window = TimeWindow::parse(&path.start_date, &path.end_date)?;
    window.check_export_limit(state.config.export_max_days)?;

    let catalog = state.catalog().await?;
    let field = catalog.lookup(&path.name, &path.field)?;
    let series = series_for_field(state.store.as_ref(), field, Some(window), smooth).await?;

    let filename = series_filename(&path.name, &path.field, &window, smooth);
    info!("Exporting {} points as {}", series.len(), filename);
    Ok(csv_attachment(&filename, series_csv(&series)?))
}

async fn download_metadata(State(state): State<AppState>) -> Result<Response> {
    // ---
    let rows = state.catalog().await?.metadata_rows();
    info!("GET /download-metadata - {} rows", rows.len());
    Ok(csv_attachment(METADATA_FILENAME, metadata_csv(&rows)?))
}
