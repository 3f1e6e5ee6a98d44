//! HTTP-facing error type

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::client::{BackendError, TransportError};
use crate::services::{AdminError, IdentityError, ResolverError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Verification or authorization refused (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Backend data unavailable (502); the operator may retry
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(#[from] chantrack_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, bool) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", false),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", false),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", false),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE", true),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", false),
            ApiError::Common(chantrack_common::Error::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", false)
            }
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR", false),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, retryable) = self.parts();
        let message = match &self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::Upstream(msg)
            | ApiError::Internal(msg) => msg.clone(),
            ApiError::Common(err) => err.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "retryable": retryable,
            }
        }));

        (status, body).into_response()
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(_) => ApiError::Upstream(err.to_string()),
            BackendError::InvalidBaseUrl(..) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::VerificationRequired | AdminError::VerificationFailed { .. } => {
                ApiError::Forbidden(err.to_string())
            }
            AdminError::InvalidInput(msg) => ApiError::BadRequest(msg),
            AdminError::Rejected { status: 404, message } => ApiError::NotFound(message),
            AdminError::Rejected { .. } | AdminError::Unreachable(_) | AdminError::Identity(_) => {
                ApiError::Upstream(err.to_string())
            }
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<ResolverError> for ApiError {
    fn from(err: ResolverError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Failure to assemble the application state
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("HTTP client setup failed: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
