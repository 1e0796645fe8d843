//! Filename sanitization
//!
//! Declared filenames end up in storage keys and download headers, so the
//! response always carries a cleaned name. The original is echoed separately.

use std::fmt;

/// Longest sanitized name, in bytes
pub const MAX_FILENAME_BYTES: usize = 255;

/// Name used when nothing usable is left
pub const FALLBACK_FILENAME: &str = "upload";

const RESERVED: &[char] = &['<', '>', ':', '"', '|', '?', '*'];
const MAX_PRESERVED_EXTENSION: usize = 16;

/// Something sanitization had to change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameIssue {
    /// Directory components were present
    PathComponents,
    /// Control characters were present
    ControlCharacters,
    /// `..` sequences were present
    Traversal,
    /// Characters reserved on common filesystems were present
    ReservedCharacters,
    /// Leading dots or surrounding whitespace were present
    LeadingDots,
    /// The name exceeded [`MAX_FILENAME_BYTES`]
    TooLong,
    /// Nothing usable remained
    Empty,
}

impl FilenameIssue {
    /// Short description for diagnostics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PathComponents => "path components removed",
            Self::ControlCharacters => "control characters removed",
            Self::Traversal => "traversal sequences removed",
            Self::ReservedCharacters => "reserved characters replaced",
            Self::LeadingDots => "leading dots or whitespace trimmed",
            Self::TooLong => "name truncated",
            Self::Empty => "empty name replaced",
        }
    }
}

impl fmt::Display for FilenameIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of sanitizing a declared filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedFilename {
    /// Name safe for storage keys
    pub name: String,
    /// What had to change; empty when the name was already clean
    pub issues: Vec<FilenameIssue>,
}

impl SanitizedFilename {
    /// Whether sanitization changed anything
    #[must_use]
    pub fn modified(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Sanitizes a declared filename
///
/// # Examples
///
/// ```rust
/// use upload_validator::validation::filename::sanitize_filename;
///
/// let clean = sanitize_filename("../../etc/passwd");
/// assert_eq!(clean.name, "passwd");
/// assert!(clean.modified());
///
/// assert_eq!(sanitize_filename("Claim Form.pdf").name, "Claim Form.pdf");
/// ```
#[must_use]
pub fn sanitize_filename(original: &str) -> SanitizedFilename {
    let mut issues = Vec::new();

    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original);
    if base.len() != original.len() {
        issues.push(FilenameIssue::PathComponents);
    }

    let mut name: String = base.chars().filter(|c| !c.is_control()).collect();
    if name.len() != base.len() {
        issues.push(FilenameIssue::ControlCharacters);
    }

    if name.contains("..") {
        while name.contains("..") {
            name = name.replace("..", "");
        }
        issues.push(FilenameIssue::Traversal);
    }

    if name.contains(RESERVED) {
        name = name.replace(RESERVED, "_");
        issues.push(FilenameIssue::ReservedCharacters);
    }

    let trimmed = name
        .trim_start_matches(|c: char| c == '.' || c.is_whitespace())
        .trim_end();
    if trimmed.len() != name.len() {
        name = trimmed.to_string();
        issues.push(FilenameIssue::LeadingDots);
    }

    if name.len() > MAX_FILENAME_BYTES {
        name = truncate_preserving_extension(&name, MAX_FILENAME_BYTES);
        issues.push(FilenameIssue::TooLong);
    }

    if name.is_empty() {
        name = FALLBACK_FILENAME.to_string();
        issues.push(FilenameIssue::Empty);
    }

    SanitizedFilename { name, issues }
}

fn truncate_preserving_extension(name: &str, max: usize) -> String {
    let extension = name
        .rfind('.')
        .map(|dot| &name[dot..])
        .filter(|ext| ext.len() <= MAX_PRESERVED_EXTENSION)
        .unwrap_or("");
    let stem = &name[..name.len() - extension.len()];
    let budget = max - extension.len();

    let mut end = budget.min(stem.len());
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{extension}", &stem[..end])
}
