//! Error types and error handling
//!
//! Upload rejections are not errors: they are [`crate::validation::Verdict`]
//! values. [`ValidatorError`] covers the cases where the validator could not
//! reach a verdict at all.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Validator fault
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// I/O error while reading the upload
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The upload stream failed mid-transfer
    #[error("Upload stream error: {0}")]
    Stream(String),

    /// Validation aborted through the cancellation token
    #[error("Validation cancelled")]
    Cancelled,

    /// The stream was not consumed before the deadline
    #[error("Validation deadline exceeded")]
    DeadlineExceeded,

    /// Invalid validator configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ValidatorError {
    /// HTTP status reported for this fault
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for the response body
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DeadlineExceeded => "VALIDATION_TIMEOUT",
            Self::Cancelled => "VALIDATION_CANCELLED",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Message safe to return to clients
    ///
    /// Internal details stay in the logs.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::DeadlineExceeded => "Validation did not complete in time",
            Self::Cancelled => "Validation was cancelled because the service is shutting down",
            _ => "File validation failed due to an internal error",
        }
    }
}

/// JSON body for responses that carry no verdict
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Always false
    pub valid: bool,
    /// Human-readable message
    pub error: String,
    /// Machine-readable code
    pub code: &'static str,
}

impl ErrorBody {
    /// Creates an error body
    #[must_use]
    pub fn new(error: impl Into<String>, code: &'static str) -> Self {
        Self {
            valid: false,
            error: error.into(),
            code,
        }
    }
}

impl IntoResponse for ValidatorError {
    fn into_response(self) -> Response {
        let body = ErrorBody::new(self.public_message(), self.code());
        (self.status(), Json(body)).into_response()
    }
}
