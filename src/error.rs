use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::extract::ExtractError;

/// Outcome of a single call against a single model.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Transient overload (HTTP 503). The only retryable case.
    #[error("model overloaded")]
    Overloaded,
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("malformed upstream response: {0}")]
    Malformed(String),
    #[error("unparsable model output: {0}")]
    Parse(#[from] ExtractError),
}

impl AttemptError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttemptError::Overloaded)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("all models unavailable after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Errors surfaced to HTTP callers. Messages are user-facing.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("server is missing its API credential")]
    Configuration,
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Configuration | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
