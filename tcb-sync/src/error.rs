//! HTTP error mapping for the trigger API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// API-facing error with an HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    /// The requested job is already running (triggers are not queued)
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{e:#}"))
    }
}

impl From<tcb_common::Error> for ApiError {
    fn from(e: tcb_common::Error) -> Self {
        use tcb_common::Error;
        match e {
            Error::NotFound(m) => ApiError::NotFound(m),
            Error::InvalidInput(m) => ApiError::BadRequest(m),
            Error::Config(m) => ApiError::BadRequest(m),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_errors_map_to_expected_statuses() {
        let not_found: ApiError = tcb_common::Error::NotFound("job".into()).into();
        assert!(matches!(not_found, ApiError::NotFound(_)));

        let bad: ApiError = tcb_common::Error::InvalidInput("x".into()).into();
        assert!(matches!(bad, ApiError::BadRequest(_)));

        let internal: ApiError =
            tcb_common::Error::RateLimited { context: "batch".into() }.into();
        assert!(matches!(internal, ApiError::Internal(_)));
    }
}
