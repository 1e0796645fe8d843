//! upload-validator: streaming gatekeeper for untrusted file uploads
//!
//! Decides whether an uploaded file may proceed to storage. Content is
//! identified by magic numbers rather than by the client's claims, and PDFs
//! receive a deeper inspection for decompression bombs, embedded foreign
//! formats, script smuggling, active content, and structural corruption.
//!
//! The library is transport-agnostic: [`validation::UploadValidator`] takes a
//! byte stream or reader. The [`server`] module wraps it in an axum service
//! exposing `POST /validate-file-upload`, and the `upload-validator` binary
//! also offers a `check` command for files on disk.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use upload_validator::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     upload_validator::observability::init()?;
//!
//!     let config = ValidatorConfig::load(None)?;
//!     let state = AppState::with_config(config)?;
//!
//!     upload_validator::server::serve(state).await
//! }
//! ```
//!
//! # Design Principles
//!
//! 1. **Never trust the client**: declared names, types and sizes are hints
//! 2. **Bounded memory**: only a header window, a body prefix and a trailer
//!    window are retained, whatever the upload size
//! 3. **Deterministic verdicts**: the same bytes and metadata always produce
//!    the same outcome

#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod observability;
pub mod server;
pub mod state;
pub mod validation;

pub mod prelude {
    //! Convenience re-exports for common types
    //!
    //! # Examples
    //!
    //! ```rust
    //! use upload_validator::prelude::*;
    //! ```

    pub use crate::config::{CrossValidationPolicy, ValidatorConfig};
    pub use crate::error::ValidatorError;
    pub use crate::state::AppState;
    pub use crate::validation::{
        Acceptance, CancellationToken, FormatTag, RejectCode, Rejection, UploadMeta,
        UploadValidator, ValidationContext, Verdict,
    };

    pub use axum;
}
