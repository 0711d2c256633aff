//! Error types for syncsong-server
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! HTTP handlers return them directly; [`IntoResponse`] maps each variant to a
//! status code and a JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main error type for the authority
#[derive(Error, Debug)]
pub enum Error {
    /// Shared protocol/config errors
    #[error(transparent)]
    Common(#[from] syncsong_common::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors (bind, serve)
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Upstream catalog errors
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Invalid request or participant command
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using syncsong-server Error
pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Catalog(_) => (StatusCode::BAD_GATEWAY, "CATALOG_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
