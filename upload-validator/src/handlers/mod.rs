//! HTTP handlers
//!
//! ```rust,no_run
//! use axum::{routing::post, Router};
//! use upload_validator::handlers::validate_file_upload;
//! use upload_validator::state::AppState;
//!
//! # fn example() -> anyhow::Result<()> {
//! let app: Router = Router::new()
//!     .route("/validate-file-upload", post(validate_file_upload))
//!     .with_state(AppState::new()?);
//! # Ok(())
//! # }
//! ```

pub mod validate;

pub use validate::{validate_file_upload, UploadRequestError, FILE_FIELD, REQUEST_ID_HEADER};
