use axum::Json;
use axum::{
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::result::ApiResponse;
use crate::utils::error_codes;

/// Failures surfaced by a storage strategy.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The counter store could not be reached, timed out, or answered with a
    /// protocol-level failure.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// A stored counter could not be read as an integer.
    #[error("corrupt counter state for key {key}: {value:?}")]
    CorruptState { key: String, value: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for StoreError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        StoreError::Unavailable("operation timed out".to_string())
    }
}

#[derive(Debug)]
pub enum AppError {
    RateLimited { retry_after_secs: u64 },
    StoreUnavailable,
    Unauthorized,
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg, resp_data) = match &self {
            AppError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                error_codes::RATE_LIMIT,
                "you have reached the maximum number of requests or actions allowed within a certain time frame"
                    .to_string(),
                Some(serde_json::json!({ "retry_after_seconds": retry_after_secs })),
            ),
            AppError::StoreUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                error_codes::STORE_UNAVAILABLE,
                "rate limiting is temporarily unavailable".to_string(),
                None,
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                "token required".to_string(),
                None,
            ),
            AppError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                error_codes::VALIDATION_ERROR,
                reason.clone(),
                None,
            ),
        };

        let body = Json(ApiResponse {
            code,
            msg,
            resp_data,
        });

        let mut response = (status, body).into_response();
        if let AppError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}
