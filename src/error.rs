//! Error taxonomy for the dashboard backend.
//!
//! Every public operation maps its internal failures onto one [`AppError`]
//! variant, so the HTTP layer never sees an unclassified error:
//!
//! - **`Config`**: the lookup table or environment is unusable. Fatal at startup.
//! - **`Validation`**: bad dates, unknown themes, malformed uploads. The caller
//!   can fix the request and retry.
//! - **`NotFound`**: no catalog entry for the requested display name/field.
//! - **`PeriodTooLong`**: an export window exceeded the configured limit.
//! - **`StoreTimeout`** / **`Store`**: the persistent store failed or hung.
//!   Reads are safe to retry; ingestion writes are not retried automatically.
//! - **`Internal`**: a response could not be rendered (e.g. CSV export).
//!
//! Extractor rejections (bad query strings, malformed JSON, non-UTF-8
//! bodies) are converted into `Validation`, so they share the JSON error
//! shape.

use std::time::Duration;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection, StringRejection},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Where to point users who need more than one export window of data.
pub const FULL_SERIES_URL: &str = "http://doi.org/10.25405/data.ncl.14605569";

/// Convenience alias for results using the application error type.
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(
        "Requested period too long, must be less than {max_days} days. \
         To download full series go to {}",
        FULL_SERIES_URL
    )]
    PeriodTooLong { max_days: u32 },

    #[error("Store operation '{op}' timed out after {timeout:?}")]
    StoreTimeout { op: &'static str, timeout: Duration },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        AppError::Config(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::PeriodTooLong { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StoreTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Config(_) | AppError::Store(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Store(e.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::Validation(format!("CSV error: {e}"))
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(e: PathRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl From<StringRejection> for AppError {
    fn from(e: StringRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

/// JSON body for every error response except the export length limit.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        match &self {
            AppError::Store(_)
            | AppError::StoreTimeout { .. }
            | AppError::Config(_)
            | AppError::Internal(_) => {
                tracing::error!("{}", self)
            }
            _ => tracing::warn!("{}", self),
        }

        if let AppError::PeriodTooLong { .. } = self {
            // Download links expect a file, so the limit is reported as text.
            return (
                status,
                [
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                    (header::CONTENT_DISPOSITION, "attachment; filename=\"error.txt\""),
                ],
                self.to_string(),
            )
                .into_response();
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
