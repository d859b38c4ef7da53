//! Route gateway (EMBP): every endpoint module exports a subrouter, merged here.

use std::sync::Arc;

use axum::Router;

use crate::catalog::{reconcile, Catalog};
use crate::error::Result;
use crate::lookup::FieldLookupTable;
use crate::store::ReadingStore;
use crate::Config;

mod catalog;
mod download;
mod health;
mod series;
mod upload;

// ---

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
    pub lookup: Arc<FieldLookupTable>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn ReadingStore>, lookup: FieldLookupTable, config: Config) -> Self {
        Self {
            store,
            lookup: Arc::new(lookup),
            config,
        }
    }

    /// Rebuild the catalog from the store's current field summaries.
    pub async fn catalog(&self) -> Result<Catalog> {
        // ---
        let documents = self.store.sensor_documents().await?;
        Ok(reconcile(&documents, &self.lookup))
    }
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(catalog::router())
        .merge(series::router())
        .merge(download::router())
        .merge(upload::router())
        .merge(health::router())
        .with_state(state)
}
