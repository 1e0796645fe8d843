//! Core types for upload validation
//!
//! A validation call produces a [`Verdict`]: either an [`Acceptance`] carrying
//! the detected format and the checks that ran, or a [`Rejection`] carrying a
//! machine-readable [`RejectCode`] and diagnostic details. Rejections are values,
//! not errors; only validator faults use [`crate::error::ValidatorError`].

use super::pdf::PdfReport;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Content format identified from a file's leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    /// Portable Document Format
    Pdf,
    /// PNG image
    Png,
    /// JPEG image
    Jpeg,
    /// GIF image
    Gif,
    /// WebP image (RIFF container)
    Webp,
    /// TIFF image
    Tiff,
    /// Windows bitmap
    Bmp,
    /// OLE2 compound document (legacy .doc/.xls/.ppt)
    Ole,
    /// Office Open XML word processing document
    Docx,
    /// Office Open XML spreadsheet
    Xlsx,
    /// Office Open XML presentation
    Pptx,
    /// DOS/Windows executable
    Exe,
    /// ELF executable
    Elf,
    /// Mach-O executable
    Macho,
    /// Java class file
    JavaClass,
    /// Shell script (shebang)
    Script,
    /// PHP source
    Php,
    /// WebAssembly module
    Wasm,
    /// Generic ZIP archive (not an Office Open XML package)
    Zip,
    /// RAR archive
    Rar,
    /// 7-Zip archive
    SevenZip,
    /// gzip stream
    Gzip,
    /// bzip2 stream
    Bzip2,
    /// xz stream
    Xz,
    /// Microsoft cabinet archive
    Cab,
}

impl FormatTag {
    /// Short identifier used in responses and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::Ole => "ole",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Pptx => "pptx",
            Self::Exe => "exe",
            Self::Elf => "elf",
            Self::Macho => "macho",
            Self::JavaClass => "java_class",
            Self::Script => "script",
            Self::Php => "php",
            Self::Wasm => "wasm",
            Self::Zip => "zip",
            Self::Rar => "rar",
            Self::SevenZip => "seven_zip",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Cab => "cab",
        }
    }

    /// Human-readable description for error messages
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Pdf => "PDF document",
            Self::Png => "PNG image",
            Self::Jpeg => "JPEG image",
            Self::Gif => "GIF image",
            Self::Webp => "WebP image",
            Self::Tiff => "TIFF image",
            Self::Bmp => "BMP image",
            Self::Ole => "legacy Office document",
            Self::Docx => "Word document",
            Self::Xlsx => "Excel spreadsheet",
            Self::Pptx => "PowerPoint presentation",
            Self::Exe => "Windows executable",
            Self::Elf => "ELF executable",
            Self::Macho => "Mach-O executable",
            Self::JavaClass => "Java class file",
            Self::Script => "shell script",
            Self::Php => "PHP script",
            Self::Wasm => "WebAssembly module",
            Self::Zip => "ZIP archive",
            Self::Rar => "RAR archive",
            Self::SevenZip => "7-Zip archive",
            Self::Gzip => "gzip archive",
            Self::Bzip2 => "bzip2 archive",
            Self::Xz => "xz archive",
            Self::Cab => "cabinet archive",
        }
    }

    /// Declared MIME types that correspond to this format
    ///
    /// Dangerous formats map to nothing: no declared type legitimizes them.
    #[must_use]
    pub const fn mime_types(self) -> &'static [&'static str] {
        match self {
            Self::Pdf => &["application/pdf"],
            Self::Png => &["image/png"],
            Self::Jpeg => &["image/jpeg", "image/jpg", "image/pjpeg"],
            Self::Gif => &["image/gif"],
            Self::Webp => &["image/webp"],
            Self::Tiff => &["image/tiff"],
            Self::Bmp => &["image/bmp", "image/x-ms-bmp"],
            Self::Ole => &[
                "application/msword",
                "application/vnd.ms-excel",
                "application/vnd.ms-powerpoint",
            ],
            Self::Docx => {
                &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"]
            }
            Self::Xlsx => &["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"],
            Self::Pptx => {
                &["application/vnd.openxmlformats-officedocument.presentationml.presentation"]
            }
            _ => &[],
        }
    }

    /// Whether `declared` (already normalized) names this format
    #[must_use]
    pub fn matches_mime(self, declared: &str) -> bool {
        self.mime_types().contains(&declared)
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an upload was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    /// Zero bytes received
    EmptyFile,
    /// Measured size above the ceiling for the declared type
    FileTooLarge,
    /// Declared MIME type is not on the allow-list
    MimeTypeNotAllowed,
    /// Content matched an executable, script or archive signature
    DangerousFileType,
    /// Content matched no known signature
    UnrecognizedContent,
    /// Detected content disagrees with the declared type (strict policy)
    ContentTypeMismatch,
    /// Filename needed sanitizing (strict filename policy)
    UnsafeFilename,
    /// PDF does not start with a well-formed `%PDF-M.m` header
    MalformedPdfHeader,
    /// PDF trailer lacks the `%%EOF` marker
    MalformedPdfEof,
    /// PDF version above the configured ceiling
    PdfVersionUnsupported,
    /// Stream-count heuristic suggests a decompression bomb
    SuspectedCompressionBomb,
    /// Another container format is embedded in the PDF
    PolyglotDetected,
    /// Script or HTML markup embedded in the PDF
    ScriptSmugglingDetected,
    /// PDF carries auto-executing or embedded active content
    ActiveContentDetected,
    /// Unbalanced objects or missing xref/trailer
    StructuralCorruption,
    /// Detected format exceeds its own size ceiling
    SizeLimitExceededHard,
}

impl RejectCode {
    /// Wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyFile => "EMPTY_FILE",
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::MimeTypeNotAllowed => "MIME_TYPE_NOT_ALLOWED",
            Self::DangerousFileType => "DANGEROUS_FILE_TYPE",
            Self::UnrecognizedContent => "UNRECOGNIZED_CONTENT",
            Self::ContentTypeMismatch => "CONTENT_TYPE_MISMATCH",
            Self::UnsafeFilename => "UNSAFE_FILENAME",
            Self::MalformedPdfHeader => "MALFORMED_PDF_HEADER",
            Self::MalformedPdfEof => "MALFORMED_PDF_EOF",
            Self::PdfVersionUnsupported => "PDF_VERSION_UNSUPPORTED",
            Self::SuspectedCompressionBomb => "SUSPECTED_COMPRESSION_BOMB",
            Self::PolyglotDetected => "POLYGLOT_DETECTED",
            Self::ScriptSmugglingDetected => "SCRIPT_SMUGGLING_DETECTED",
            Self::ActiveContentDetected => "ACTIVE_CONTENT_DETECTED",
            Self::StructuralCorruption => "STRUCTURAL_CORRUPTION",
            Self::SizeLimitExceededHard => "SIZE_LIMIT_EXCEEDED_HARD",
        }
    }

    /// HTTP status reported for this rejection class
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::FileTooLarge | Self::SizeLimitExceededHard => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MimeTypeNotAllowed | Self::ContentTypeMismatch => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            Self::DangerousFileType
            | Self::PolyglotDetected
            | Self::ScriptSmugglingDetected
            | Self::ActiveContentDetected => StatusCode::FORBIDDEN,
            Self::EmptyFile
            | Self::UnrecognizedContent
            | Self::UnsafeFilename
            | Self::MalformedPdfHeader
            | Self::MalformedPdfEof
            | Self::PdfVersionUnsupported
            | Self::SuspectedCompressionBomb
            | Self::StructuralCorruption => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether the rejection indicates hostile content worth auditing
    #[must_use]
    pub const fn is_security_event(self) -> bool {
        matches!(
            self,
            Self::DangerousFileType
                | Self::PolyglotDetected
                | Self::ScriptSmugglingDetected
                | Self::ActiveContentDetected
                | Self::SuspectedCompressionBomb
        )
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified rejection with diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Rejection class
    pub code: RejectCode,

    /// Human-readable message for the uploader
    pub message: String,

    /// Diagnostic details (sizes, offsets, matched patterns)
    pub details: Option<Value>,

    /// SHA-256 of the content, when the whole stream was read
    pub fingerprint: Option<String>,
}

impl Rejection {
    /// Creates a rejection without details
    #[must_use]
    pub fn new(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            fingerprint: None,
        }
    }

    /// Attaches diagnostic details
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub(crate) fn with_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.fingerprint = fingerprint;
        self
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Which validation stages ran and passed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationChecks {
    /// Size within bounds
    pub size_check: bool,
    /// Declared MIME type on the allow-list
    pub mime_type_check: bool,
    /// Content signature recognized and safe
    pub magic_number_check: bool,
    /// Detected format agrees with the declared type
    pub cross_validation: bool,
    /// Bomb, script and active-content scans (PDF)
    pub security_scan: bool,
    /// Embedded-format scan (PDF)
    pub polyglot_check: bool,
    /// Object balance and xref/trailer presence (PDF)
    pub structure_integrity: bool,
}

/// An accepted upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acceptance {
    /// Sanitized filename safe for storage keys
    pub name: String,

    /// Filename as declared by the client
    pub original_name: String,

    /// Measured size in bytes
    pub size: u64,

    /// Declared MIME type (normalized)
    #[serde(rename = "type")]
    pub declared_type: String,

    /// Format detected from content
    pub detected_type: FormatTag,

    /// Hex SHA-256 of the content
    pub sha256: String,

    /// Non-fatal findings (e.g. declared/detected mismatch under the warn policy)
    pub warnings: Vec<String>,

    /// Stages performed
    pub validations: ValidationChecks,

    /// PDF measurements, present when the content is a PDF
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<PdfReport>,
}

/// Outcome of one validation call
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Upload may proceed to storage
    Accepted(Acceptance),
    /// Upload must not be stored
    Rejected(Rejection),
}

impl Verdict {
    /// True when accepted
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// HTTP status for this verdict
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Accepted(_) => StatusCode::OK,
            Self::Rejected(rejection) => rejection.code.status(),
        }
    }

    /// Rejection code, if rejected
    #[must_use]
    pub const fn reject_code(&self) -> Option<RejectCode> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(rejection) => Some(rejection.code),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum VerdictBody<'a> {
    Accepted {
        valid: bool,
        file: &'a Acceptance,
    },
    Rejected {
        valid: bool,
        error: &'a str,
        code: RejectCode,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<&'a Value>,
    },
}

impl Serialize for Verdict {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = match self {
            Self::Accepted(file) => VerdictBody::Accepted { valid: true, file },
            Self::Rejected(rejection) => VerdictBody::Rejected {
                valid: false,
                error: &rejection.message,
                code: rejection.code,
                details: rejection.details.as_ref(),
            },
        };
        body.serialize(serializer)
    }
}

/// Client-declared metadata of an upload
///
/// Everything here is untrusted. The bytes travel separately as a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMeta {
    /// Declared filename
    pub filename: String,

    /// Declared MIME type, as sent
    pub content_type: String,

    /// Declared size, if the client sent one
    pub declared_size: Option<u64>,
}

impl UploadMeta {
    /// Creates upload metadata
    ///
    /// # Examples
    ///
    /// ```rust
    /// use upload_validator::validation::UploadMeta;
    ///
    /// let meta = UploadMeta::new("scan.pdf", "application/pdf").with_declared_size(1024);
    /// assert_eq!(meta.declared_size, Some(1024));
    /// ```
    #[must_use]
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            declared_size: None,
        }
    }

    /// Records the size the client claims to send
    #[must_use]
    pub const fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reject_code_status_mapping() {
        assert_eq!(RejectCode::EmptyFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(RejectCode::FileTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            RejectCode::SizeLimitExceededHard.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            RejectCode::MimeTypeNotAllowed.status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(RejectCode::DangerousFileType.status(), StatusCode::FORBIDDEN);
        assert_eq!(RejectCode::PolyglotDetected.status(), StatusCode::FORBIDDEN);
        assert_eq!(RejectCode::MalformedPdfEof.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_reject_code_serializes_screaming_snake() {
        let value = serde_json::to_value(RejectCode::SuspectedCompressionBomb).unwrap();
        assert_eq!(value, json!("SUSPECTED_COMPRESSION_BOMB"));
        assert_eq!(
            RejectCode::SuspectedCompressionBomb.as_str(),
            "SUSPECTED_COMPRESSION_BOMB"
        );
    }

    #[test]
    fn test_security_events() {
        assert!(RejectCode::DangerousFileType.is_security_event());
        assert!(RejectCode::ActiveContentDetected.is_security_event());
        assert!(RejectCode::SuspectedCompressionBomb.is_security_event());
        assert!(!RejectCode::EmptyFile.is_security_event());
        assert!(!RejectCode::FileTooLarge.is_security_event());
    }

    #[test]
    fn test_format_tag_mime_mapping() {
        assert!(FormatTag::Pdf.matches_mime("application/pdf"));
        assert!(FormatTag::Ole.matches_mime("application/vnd.ms-excel"));
        assert!(!FormatTag::Png.matches_mime("image/jpeg"));
        assert!(FormatTag::Exe.mime_types().is_empty());
    }

    #[test]
    fn test_rejected_body_shape() {
        let verdict = Verdict::Rejected(
            Rejection::new(RejectCode::FileTooLarge, "too big")
                .with_details(json!({"size": 10, "limit": 5})),
        );
        let body = serde_json::to_value(&verdict).unwrap();
        assert_eq!(body["valid"], json!(false));
        assert_eq!(body["error"], json!("too big"));
        assert_eq!(body["code"], json!("FILE_TOO_LARGE"));
        assert_eq!(body["details"]["limit"], json!(5));
    }

    #[test]
    fn test_rejected_body_omits_missing_details() {
        let verdict = Verdict::Rejected(Rejection::new(RejectCode::EmptyFile, "empty"));
        let body = serde_json::to_value(&verdict).unwrap();
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_accepted_body_shape() {
        let verdict = Verdict::Accepted(Acceptance {
            name: "scan.pdf".to_string(),
            original_name: "../scan.pdf".to_string(),
            size: 512,
            declared_type: "application/pdf".to_string(),
            detected_type: FormatTag::Pdf,
            sha256: "00".to_string(),
            warnings: Vec::new(),
            validations: ValidationChecks {
                size_check: true,
                ..ValidationChecks::default()
            },
            pdf: None,
        });
        let body = serde_json::to_value(&verdict).unwrap();
        assert_eq!(body["valid"], json!(true));
        assert_eq!(body["file"]["originalName"], json!("../scan.pdf"));
        assert_eq!(body["file"]["type"], json!("application/pdf"));
        assert_eq!(body["file"]["detectedType"], json!("pdf"));
        assert_eq!(body["file"]["validations"]["sizeCheck"], json!(true));
        assert_eq!(body["file"]["validations"]["polyglotCheck"], json!(false));
        assert!(body["file"].get("pdf").is_none());
    }
}
