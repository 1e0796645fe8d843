//! Declared MIME type handling
//!
//! The declared type is client-provided and untrusted. It decides which size
//! ceiling applies and must be on the allow-list, but the format that matters
//! is the one detected from content (see [`super::signatures`]). This module
//! normalizes declared types, enforces the allow-list, cross-checks declared
//! against detected types, and produces best-effort hints for diagnostics.
//!
//! # Examples
//!
//! ```rust
//! use upload_validator::validation::mime::{normalize_mime_type, MimeValidator};
//! use upload_validator::config::MimeSettings;
//!
//! assert_eq!(normalize_mime_type("Application/PDF; charset=binary"), "application/pdf");
//!
//! let validator = MimeValidator::new(&MimeSettings::default());
//! assert!(validator.is_allowed("application/pdf"));
//! assert!(!validator.is_allowed("text/html"));
//! ```

use super::types::FormatTag;
use crate::config::{CrossValidationPolicy, MimeSettings};
use std::collections::HashSet;

/// Strips parameters and lowercases a declared MIME type
///
/// Falls back to a plain split on `;` when the value does not parse as a media
/// type, so malformed headers still produce something comparable.
#[must_use]
pub fn normalize_mime_type(raw: &str) -> String {
    raw.trim().parse::<mime::Mime>().map_or_else(
        |_| {
            raw.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        },
        |parsed| parsed.essence_str().to_ascii_lowercase(),
    )
}

/// Best-effort MIME type sniffed by the `infer` crate
///
/// Only used to enrich `UNRECOGNIZED_CONTENT` diagnostics.
#[must_use]
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    infer::get(data).map(|kind| kind.mime_type())
}

/// Whether two normalized MIME types name the same format
#[must_use]
pub fn same_format(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    [
        FormatTag::Jpeg,
        FormatTag::Bmp,
        FormatTag::Ole,
        FormatTag::Tiff,
    ]
    .iter()
    .any(|tag| tag.matches_mime(a) && tag.matches_mime(b))
}

/// Declared-type policy built from configuration
#[derive(Debug, Clone)]
pub struct MimeValidator {
    allowed: HashSet<String>,
    policy: CrossValidationPolicy,
}

impl MimeValidator {
    /// Creates a validator from the `[mime]` settings
    #[must_use]
    pub fn new(settings: &MimeSettings) -> Self {
        Self {
            allowed: settings
                .allowed_types
                .iter()
                .map(|mime| normalize_mime_type(mime))
                .collect(),
            policy: settings.cross_validation,
        }
    }

    /// Whether a normalized declared type is on the allow-list
    #[must_use]
    pub fn is_allowed(&self, declared: &str) -> bool {
        self.allowed.contains(declared)
    }

    /// Allow-listed types, sorted, for diagnostics
    #[must_use]
    pub fn allowed_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.allowed.iter().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Cross-validation policy in force
    #[must_use]
    pub const fn policy(&self) -> CrossValidationPolicy {
        self.policy
    }

    /// Whether detected content agrees with the declared type
    #[must_use]
    pub fn content_matches(detected: FormatTag, declared: &str) -> bool {
        detected.matches_mime(declared)
    }

    /// Warning when the filename extension disagrees with the declared type
    ///
    /// Unknown or missing extensions produce no warning.
    #[must_use]
    pub fn extension_warning(filename: &str, declared: &str) -> Option<String> {
        let guesses: Vec<String> = mime_guess::from_path(filename)
            .iter()
            .map(|guess| guess.essence_str().to_ascii_lowercase())
            .collect();

        if guesses.is_empty() || guesses.iter().any(|guess| same_format(guess, declared)) {
            return None;
        }

        Some(format!(
            "File extension suggests {} but declared type is {declared}",
            guesses[0]
        ))
    }
}
