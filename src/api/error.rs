use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::bus::BusError;
use crate::engine::EngineError;
use crate::error::StudyError;

/// API error types that can be returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{message}")]
    Forbidden { code: &'static str, message: String },

    #[error("{code}: a computation is already running")]
    NotRunnable { code: &'static str },

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Upstream service timed out")]
    UpstreamTimeout,

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl ApiError {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden { .. } | ApiError::NotRunnable { .. } => StatusCode::FORBIDDEN,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error type string
    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::Forbidden { .. } => "Forbidden",
            ApiError::NotRunnable { .. } => "NotRunnable",
            ApiError::Upstream(_) | ApiError::UpstreamTimeout => "UpstreamError",
            ApiError::InternalError(_) => "InternalServerError",
            ApiError::ServiceUnavailable(_) => "ServiceUnavailable",
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::NotFound(_) => Some("NOT_FOUND"),
            ApiError::Forbidden { code, .. } | ApiError::NotRunnable { code } => Some(*code),
            ApiError::Upstream(_) | ApiError::UpstreamTimeout => Some("UPSTREAM_ERROR"),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let message = match &self {
            ApiError::InternalError(_) => {
                tracing::error!(error = %self, "API error occurred");
                "An internal error occurred".to_string()
            }
            ApiError::Upstream(_) | ApiError::UpstreamTimeout | ApiError::ServiceUnavailable(_) => {
                tracing::warn!(error = %self, "Upstream failure");
                self.to_string()
            }
            _ => {
                tracing::debug!(error = %self, "Client error");
                self.to_string()
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
            code: self.code(),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<StudyError> for ApiError {
    fn from(error: StudyError) -> Self {
        match error {
            StudyError::NotFound { .. } => ApiError::NotFound(error.to_string()),
            StudyError::Forbidden { code, message } => ApiError::Forbidden { code, message },
            StudyError::NotRunnable { code } => ApiError::NotRunnable { code },
            StudyError::Upstream(EngineError::Timeout) => ApiError::UpstreamTimeout,
            StudyError::Upstream(EngineError::Unavailable(computation)) => {
                ApiError::ServiceUnavailable(format!("no engine for {}", computation))
            }
            StudyError::Upstream(e) => ApiError::Upstream(e.to_string()),
            StudyError::Internal(_) => ApiError::InternalError(error.to_string()),
        }
    }
}

impl From<BusError> for ApiError {
    fn from(error: BusError) -> Self {
        match error {
            BusError::UnknownDestination(_) => ApiError::NotFound(error.to_string()),
            BusError::Closed(_) => ApiError::ServiceUnavailable(error.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::InternalError(error.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}
