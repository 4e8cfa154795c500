//! Error handling with plain-text responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pgo_store::StoreError;

pub type Result<T> = std::result::Result<T, AppError>;

/// Request-level error, rendered as its message with the mapped status.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoProfile { .. } => Self::NotFound(err.to_string()),
            StoreError::EmptyTag => Self::BadRequest(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Startup and serve-loop failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_status() {
        let cases = [
            (StoreError::no_profile("svc"), StatusCode::NOT_FOUND),
            (StoreError::EmptyTag, StatusCode::BAD_REQUEST),
            (StoreError::Closed, StatusCode::INTERNAL_SERVER_ERROR),
            (StoreError::database("disk I/O error"), StatusCode::INTERNAL_SERVER_ERROR),
            (StoreError::stream("connection reset"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_message_is_passed_through() {
        let err = AppError::from(StoreError::EmptyTag);
        assert_eq!(err.to_string(), "No tag supplied");

        let response = AppError::bad_request("Unrecognized file: other").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
