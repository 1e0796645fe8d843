//! Upload validation
//!
//! This module decides whether a single uploaded file may proceed to storage.
//! Checks run fail-fast in a fixed order: emptiness, size ceiling, filename
//! policy, declared MIME allow-list, magic numbers, per-format ceiling,
//! declared/detected cross-validation, and for PDFs a structural and security
//! inspection.
//!
//! # Security
//!
//! **Never trust client-provided metadata alone!** Filenames, declared types
//! and declared sizes are treated as hints. Formats are identified from content
//! and sizes are measured while streaming.
//!
//! # Examples
//!
//! ```rust
//! use upload_validator::config::ValidatorConfig;
//! use upload_validator::validation::{UploadMeta, UploadValidator, ValidationContext};
//!
//! # async fn example() -> Result<(), upload_validator::error::ValidatorError> {
//! let validator = UploadValidator::new(ValidatorConfig::default())?;
//! let meta = UploadMeta::new("notes.pdf", "application/pdf");
//! let body = futures_util::stream::iter(vec![Ok::<_, std::io::Error>(b"%PDF-1.4\n".to_vec())]);
//!
//! let verdict = validator.validate(&meta, body, &ValidationContext::default()).await?;
//! assert!(!verdict.is_valid());
//! # Ok(())
//! # }
//! ```

pub mod cancellation;
pub mod capture;
pub mod filename;
pub mod mime;
pub mod pdf;
pub mod pipeline;
pub mod signatures;
pub mod types;

pub use cancellation::{CancellationToken, ValidationContext};
pub use capture::{CapturedUpload, StreamCapture};
pub use pdf::{PdfInspector, PdfReport, PdfVersion};
pub use pipeline::UploadValidator;
pub use types::{
    Acceptance, FormatTag, RejectCode, Rejection, UploadMeta, ValidationChecks, Verdict,
};
