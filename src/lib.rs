//! Backend for the NGIF environmental sensor dashboard.
//!
//! Module gateway (EMBP). The layers, leaves first:
//! - [`store`]: reading store contract, with Postgres and in-memory backends
//! - [`lookup`]: static field lookup table, loaded once at startup
//! - [`catalog`]: reconciles live field summaries with the lookup table
//! - [`series`]: resolves display identifiers and builds (smoothed) series
//! - [`ingest`]: parses uploads, dedups by recency, refreshes summaries
//! - [`export`]: CSV rendering for downloads
//! - [`routes`]: axum routers exposing all of the above

pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod lookup;
pub mod models;
pub mod routes;
pub mod schema;
pub mod series;
pub mod store;

pub use config::Config;
pub use error::{AppError, Result};
pub use models::{CanonicalField, FieldValue, RawBatch, Series};
