//! The error taxonomy that crosses the public HTTP boundary.
//!
//! Backend-originated HTTP statuses pass through untouched (the proxy
//! mirrors them 1:1); this enum only covers errors the control plane itself
//! raises before or after talking to a backend.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ModelZooError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("unsupported model format: {0}")]
    UnsupportedFormat(String),

    #[error("no diffusion model specified in checkpoint")]
    MissingDiffusionModel,

    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ModelZooError {
    fn into_response(self) -> Response {
        let status = match &self {
            ModelZooError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ModelZooError::NotFound(_) => StatusCode::NOT_FOUND,
            ModelZooError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            ModelZooError::MissingDiffusionModel => StatusCode::BAD_REQUEST,
            ModelZooError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ModelZooError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ModelZooError>;
