//! Selection-list and metadata-table endpoints.
//!
//! Each request rebuilds the catalog from the store, so lists reflect the
//! latest uploads without any invalidation.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AppState;
use crate::catalog::{MetadataRow, LOCATION};
use crate::error::Result;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/themes", get(themes))
        .route("/api/names", get(names))
        .route("/api/fields", get(fields))
        .route("/api/metadata", get(metadata))
}

#[derive(Debug, Deserialize)]
pub struct NamesQuery {
    theme: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FieldsQuery {
    theme: Option<String>,
    name: String,
}

/// One entry of the field dropdown.
#[derive(Debug, Serialize, PartialEq)]
pub struct FieldOption {
    pub name: String,
    pub field: String,
    pub units: String,
    pub label: String,
    /// `"{name}/{field}"`, the value the UI sends back.
    pub value: String,
    pub smoothable: bool,
}

async fn themes(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.catalog().await?.themes()))
}

async fn names(
    query: std::result::Result<Query<NamesQuery>, QueryRejection>,
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>> {
    // ---
    let Query(params) = query?;
    let theme = params.theme.as_deref().unwrap_or(LOCATION);
    let options = state.catalog().await?.group_options(theme)?;
    debug!("GET /api/names theme={} -> {} options", theme, options.len());
    Ok(Json(options))
}

async fn fields(
    query: std::result::Result<Query<FieldsQuery>, QueryRejection>,
    State(state): State<AppState>,
) -> Result<Json<Vec<FieldOption>>> {
    // ---
    let Query(params) = query?;
    let theme = params.theme.as_deref().unwrap_or(LOCATION);
    let catalog = state.catalog().await?;
    let options: Vec<FieldOption> = catalog
        .fields_in_group(theme, &params.name)?
        .into_iter()
        .map(|f| FieldOption {
            name: f.display_name.clone(),
            field: f.display_field.clone(),
            units: f.units.clone(),
            label: f.label(),
            value: format!("{}/{}", f.display_name, f.display_field),
            smoothable: f.supports_smoothing(),
        })
        .collect();
    debug!(
        "GET /api/fields theme={} name={} -> {} fields",
        theme,
        params.name,
        options.len()
    );
    Ok(Json(options))
}

async fn metadata(State(state): State<AppState>) -> Result<Json<Vec<MetadataRow>>> {
    Ok(Json(state.catalog().await?.metadata_rows()))
}
