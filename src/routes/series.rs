//! Plot data endpoint.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::AppState;
use crate::error::{AppError, Result};
use crate::models::Series;
use crate::series::{build_series, TimeWindow};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/series", get(handler))
}

/// Selection sent by the UI when it refreshes the plot.
#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    name: String,
    field: String,
    start_date: Option<String>,
    end_date: Option<String>,
    #[serde(default)]
    smooth: bool,
}

impl SeriesQuery {
    fn window(&self) -> Result<Option<TimeWindow>> {
        // ---
        match (&self.start_date, &self.end_date) {
            (Some(start), Some(end)) => TimeWindow::parse(start, end).map(Some),
            (None, None) => Ok(None),
            _ => Err(AppError::validation(
                "start_date and end_date must be given together",
            )),
        }
    }
}

async fn handler(
    query: std::result::Result<Query<SeriesQuery>, QueryRejection>,
    State(state): State<AppState>,
) -> Result<Json<Series>> {
    // ---
    let Query(params) = query?;
    info!("GET /api/series {:?}", params);

    let window = params.window()?;
    let catalog = state.catalog().await?;
    let series = build_series(
        state.store.as_ref(),
        &catalog,
        &params.name,
        &params.field,
        window,
        params.smooth,
    )
    .await?;

    Ok(Json(series))
}
