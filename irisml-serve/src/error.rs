//! Error types for the prediction service.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use irisml_core::IrisError;
use thiserror::Error;

/// Startup and lifecycle failures. Any of these ends the process.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Neither the registry nor the local file produced a model.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The local file exists but could not be loaded.
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A per-request prediction failure, rendered as `500 {"detail": ...}`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PredictError(pub String);

impl From<IrisError> for PredictError {
    fn from(err: IrisError) -> Self {
        Self(err.to_string())
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.0 });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
