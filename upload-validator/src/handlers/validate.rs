//! `POST /validate-file-upload`
//!
//! Reads the `file` part of a multipart form and streams it through the
//! shared [`UploadValidator`](crate::validation::UploadValidator). The body
//! is never buffered whole: reading stops as soon as the validator has seen
//! enough to decide.
//!
//! ```bash
//! curl -F "file=@contract.pdf;type=application/pdf" \
//!     http://localhost:8080/validate-file-upload
//! ```
//!
//! Accepted:
//! ```json
//! { "valid": true, "file": { "name": "contract.pdf", "detectedType": "pdf", ... } }
//! ```
//!
//! Rejected:
//! ```json
//! { "valid": false, "error": "...", "code": "POLYGLOT_DETECTED", "details": { ... } }
//! ```

use crate::audit;
use crate::error::{ErrorBody, ValidatorError};
use crate::state::AppState;
use crate::validation::{UploadMeta, Verdict};
use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::TryStreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{error, field, info_span, Instrument, Span};
use uuid::Uuid;

/// Multipart field holding the upload
pub const FILE_FIELD: &str = "file";

/// Response header echoing the per-request correlation id
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Request could not be read as an upload
#[derive(Debug, Error)]
pub enum UploadRequestError {
    /// No `file` part in the form
    #[error("No file provided")]
    MissingFile,

    /// Body is not a readable multipart form
    #[error("Invalid multipart request: {0}")]
    InvalidMultipart(String),
}

impl UploadRequestError {
    /// Machine-readable code for the response body
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingFile => "MISSING_FILE",
            Self::InvalidMultipart(_) => "INVALID_MULTIPART",
        }
    }
}

impl IntoResponse for UploadRequestError {
    fn into_response(self) -> Response {
        let body = ErrorBody::new(self.to_string(), self.code());
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Validate an uploaded file
///
/// Responds 200 with the acceptance record, or with the status mapped from
/// the rejection code. A body refused at the request limit is answered with a
/// `FILE_TOO_LARGE` verdict. Faults (stream failure, timeout, shutdown) are
/// reported without internal details.
pub async fn validate_file_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!(
        "validate_upload",
        request_id = %request_id,
        filename = field::Empty,
        declared_type = field::Empty,
    );

    let mut response = match validate_first_file(&state, multipart, &request_id)
        .instrument(span)
        .await
    {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

async fn validate_first_file(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
    request_id: &str,
) -> Result<Response, UploadRequestError> {
    let mut multipart =
        multipart.map_err(|e| UploadRequestError::InvalidMultipart(e.body_text()))?;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(UploadRequestError::MissingFile),
            Err(e) if is_body_limit(&e) => {
                let verdict = state.validator().body_limit_exceeded(None);
                return Ok(respond(request_id, None, &verdict));
            }
            Err(e) => return Err(UploadRequestError::InvalidMultipart(e.body_text())),
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let meta = upload_meta(&field);
        let span = Span::current();
        span.record("filename", meta.filename.as_str());
        span.record("declared_type", meta.content_type.as_str());

        let over_limit = AtomicBool::new(false);
        let body = field.inspect_err(|e| {
            if is_body_limit(e) {
                over_limit.store(true, Ordering::Relaxed);
            }
        });

        let outcome = state
            .validator()
            .validate(&meta, body, &state.request_context())
            .await;
        let response = match outcome {
            Ok(verdict) => respond(request_id, Some(&meta), &verdict),
            Err(ValidatorError::Stream(_)) if over_limit.load(Ordering::Relaxed) => {
                let verdict = state.validator().body_limit_exceeded(Some(&meta));
                respond(request_id, Some(&meta), &verdict)
            }
            Err(err) => {
                error!(error = %err, "Validation did not complete");
                err.into_response()
            }
        };
        return Ok(response);
    }
}

fn is_body_limit(err: &MultipartError) -> bool {
    err.status() == StatusCode::PAYLOAD_TOO_LARGE
}

fn respond(request_id: &str, meta: Option<&UploadMeta>, verdict: &Verdict) -> Response {
    if let Some(meta) = meta {
        audit::report(request_id, meta, verdict);
    }
    (verdict.status(), Json(verdict)).into_response()
}

fn upload_meta(field: &Field<'_>) -> UploadMeta {
    let meta = UploadMeta::new(
        field.file_name().unwrap_or_default(),
        field.content_type().unwrap_or(FALLBACK_CONTENT_TYPE),
    );

    match field
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        Some(size) => meta.with_declared_size(size),
        None => meta,
    }
}
