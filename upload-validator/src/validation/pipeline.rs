//! The validation pipeline
//!
//! [`UploadValidator`] ties the stages together. Streaming ingestion is async
//! and observes cancellation; everything after it is a pure function of the
//! captured bytes and the declared metadata, so a given input always yields
//! the same verdict.

use super::cancellation::ValidationContext;
use super::capture::{CapturedUpload, StreamCapture};
use super::filename::sanitize_filename;
use super::mime::{normalize_mime_type, sniff_mime, MimeValidator};
use super::pdf::PdfInspector;
use super::signatures::{detect, Detection};
use super::types::{
    Acceptance, FormatTag, RejectCode, Rejection, UploadMeta, ValidationChecks, Verdict,
};
use crate::config::{CrossValidationPolicy, ValidatorConfig};
use crate::error::ValidatorError;
use futures_util::Stream;
use serde_json::json;
use tokio::io::AsyncRead;
use tracing::{debug, field, info, warn};

/// Validates uploads against a fixed configuration
///
/// Construction compiles every scanner once; the validator is then shared
/// read-only across concurrent requests.
///
/// # Examples
///
/// ```rust
/// use upload_validator::config::ValidatorConfig;
/// use upload_validator::validation::{RejectCode, UploadMeta, UploadValidator};
///
/// let validator = UploadValidator::new(ValidatorConfig::default()).unwrap();
/// let meta = UploadMeta::new("photo.png", "image/png");
///
/// let verdict = validator.validate_bytes(&meta, b"MZ\x90\x00\x03\x00\x00\x00");
/// assert_eq!(verdict.reject_code(), Some(RejectCode::DangerousFileType));
/// ```
#[derive(Debug, Clone)]
pub struct UploadValidator {
    config: ValidatorConfig,
    mime: MimeValidator,
    pdf: PdfInspector,
}

impl UploadValidator {
    /// Creates a validator
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError::Config`] if the configuration is inconsistent
    /// or a configured marker cannot be compiled.
    pub fn new(config: ValidatorConfig) -> Result<Self, ValidatorError> {
        config
            .validate()
            .map_err(|e| ValidatorError::Config(e.to_string()))?;
        let mime = MimeValidator::new(&config.mime);
        let pdf = PdfInspector::new(&config.pdf)?;
        Ok(Self { config, mime, pdf })
    }

    /// Configuration in force
    #[must_use]
    pub const fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    fn capture_for(&self, meta: &UploadMeta) -> StreamCapture {
        let declared = normalize_mime_type(&meta.content_type);
        StreamCapture::new(
            &self.config.limits,
            self.config.limits.ceiling_for_mime(&declared),
        )
    }

    /// Validates an upload delivered as a byte stream
    ///
    /// # Errors
    ///
    /// Returns a [`ValidatorError`] when no verdict could be reached: the
    /// stream failed, the context was cancelled, or the deadline passed.
    pub async fn validate<S, B, E>(
        &self,
        meta: &UploadMeta,
        stream: S,
        ctx: &ValidationContext,
    ) -> Result<Verdict, ValidatorError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let mut capture = self.capture_for(meta);
        capture.ingest_stream(stream, ctx).await?;
        Ok(self.conclude(meta, &capture.finish()))
    }

    /// Validates an upload read from an [`AsyncRead`] source
    ///
    /// # Errors
    ///
    /// As [`validate`](Self::validate), with read failures reported as
    /// [`ValidatorError::Io`].
    pub async fn validate_reader<R>(
        &self,
        meta: &UploadMeta,
        reader: R,
        ctx: &ValidationContext,
    ) -> Result<Verdict, ValidatorError>
    where
        R: AsyncRead,
    {
        let mut capture = self.capture_for(meta);
        capture.ingest_reader(reader, ctx).await?;
        Ok(self.conclude(meta, &capture.finish()))
    }

    /// Validates an in-memory upload
    #[must_use]
    pub fn validate_bytes(&self, meta: &UploadMeta, data: &[u8]) -> Verdict {
        let mut capture = self.capture_for(meta);
        capture.push(data);
        self.conclude(meta, &capture.finish())
    }

    /// Verdict for an upload the transport cut off at the request body limit
    ///
    /// The body was refused before its end, so the size is only known to be
    /// above the limit. `meta` is absent when the limit hit before the file
    /// part's headers were read.
    #[must_use]
    pub fn body_limit_exceeded(&self, meta: Option<&UploadMeta>) -> Verdict {
        let limits = &self.config.limits;
        let declared = meta.map(|meta| normalize_mime_type(&meta.content_type));
        let ceiling = declared.as_deref().map_or_else(
            || limits.max_file_size.max(limits.max_pdf_size),
            |declared| limits.ceiling_for_mime(declared),
        );

        let rejection = Rejection::new(
            RejectCode::FileTooLarge,
            format!("File exceeds the maximum size of {}", human_size(ceiling)),
        )
        .with_details(json!({
            "limit": ceiling,
            "requestLimit": limits.body_limit(),
            "declaredType": declared,
            "sizeIsLowerBound": true,
        }));
        info!(code = %rejection.code, limit = ceiling, "Upload rejected at the request body limit");
        Verdict::Rejected(rejection)
    }

    fn conclude(&self, meta: &UploadMeta, upload: &CapturedUpload) -> Verdict {
        let verdict = self.evaluate(meta, upload);
        record(meta, upload, &verdict);
        verdict
    }

    /// Runs every check against a finished capture
    ///
    /// Pure: no I/O, no logging, no clock.
    #[must_use]
    pub fn evaluate(&self, meta: &UploadMeta, upload: &CapturedUpload) -> Verdict {
        match self.run_checks(meta, upload) {
            Ok(acceptance) => Verdict::Accepted(acceptance),
            Err(rejection) => Verdict::Rejected(
                rejection.with_fingerprint(upload.sha256().map(ToString::to_string)),
            ),
        }
    }

    fn run_checks(
        &self,
        meta: &UploadMeta,
        upload: &CapturedUpload,
    ) -> Result<Acceptance, Rejection> {
        let limits = &self.config.limits;
        let declared = normalize_mime_type(&meta.content_type);
        let size = upload.size();
        let mut checks = ValidationChecks::default();
        let mut warnings = Vec::new();

        if size == 0 {
            return Err(Rejection::new(RejectCode::EmptyFile, "File is empty"));
        }

        let ceiling = limits.ceiling_for_mime(&declared);
        if size > ceiling {
            return Err(Rejection::new(
                RejectCode::FileTooLarge,
                format!("File exceeds the maximum size of {}", human_size(ceiling)),
            )
            .with_details(json!({
                "size": size,
                "limit": ceiling,
                "declaredType": declared,
                "sizeIsLowerBound": upload.stopped_early(),
            })));
        }
        checks.size_check = true;

        let filename = sanitize_filename(&meta.filename);
        if filename.modified() {
            let issues: Vec<&str> = filename.issues.iter().map(|issue| issue.as_str()).collect();
            if self.config.filenames.reject_unsafe {
                return Err(Rejection::new(
                    RejectCode::UnsafeFilename,
                    "Filename contains unsafe characters or path components",
                )
                .with_details(json!({ "issues": issues, "sanitized": filename.name })));
            }
            warnings.push(format!("Filename was sanitized: {}", issues.join(", ")));
        }

        if !self.mime.is_allowed(&declared) {
            return Err(Rejection::new(
                RejectCode::MimeTypeNotAllowed,
                format!("File type '{declared}' is not allowed"),
            )
            .with_details(json!({
                "declaredType": declared,
                "allowedTypes": self.mime.allowed_types(),
            })));
        }
        checks.mime_type_check = true;

        let detected = match detect(upload.header(), upload.prefix()) {
            Detection::Allowed(tag) => tag,
            Detection::Dangerous { tag, magic } => {
                return Err(Rejection::new(
                    RejectCode::DangerousFileType,
                    format!(
                        "Dangerous file type detected and blocked: {}",
                        tag.description()
                    ),
                )
                .with_details(json!({
                    "detectedType": tag.as_str(),
                    "signature": hex::encode(magic),
                    "declaredType": declared,
                })));
            }
            Detection::Unrecognized => {
                return Err(Rejection::new(
                    RejectCode::UnrecognizedContent,
                    "File content does not match any supported format",
                )
                .with_details(json!({
                    "declaredType": declared,
                    "sniffed": sniff_mime(upload.prefix()),
                })));
            }
        };
        checks.magic_number_check = true;

        let hard_ceiling = limits.ceiling_for_format(detected);
        if size > hard_ceiling {
            return Err(Rejection::new(
                RejectCode::SizeLimitExceededHard,
                format!(
                    "{} exceeds the maximum size of {}",
                    detected.description(),
                    human_size(hard_ceiling)
                ),
            )
            .with_details(json!({
                "size": size,
                "limit": hard_ceiling,
                "detectedType": detected.as_str(),
            })));
        }

        if MimeValidator::content_matches(detected, &declared) {
            checks.cross_validation = true;
        } else {
            match self.mime.policy() {
                CrossValidationPolicy::Strict => {
                    return Err(Rejection::new(
                        RejectCode::ContentTypeMismatch,
                        format!(
                            "File content is {} but was declared as {declared}",
                            detected.description()
                        ),
                    )
                    .with_details(json!({
                        "declaredType": declared,
                        "detectedType": detected.as_str(),
                    })));
                }
                CrossValidationPolicy::Warn => warnings.push(format!(
                    "Declared type {declared} does not match detected content ({detected})"
                )),
            }
        }

        if let Some(warning) = MimeValidator::extension_warning(&meta.filename, &declared) {
            warnings.push(warning);
        }

        let pdf = if detected == FormatTag::Pdf {
            let report = self.pdf.inspect(upload)?;
            checks.security_scan = true;
            checks.polyglot_check = true;
            checks.structure_integrity = true;
            Some(report)
        } else {
            None
        };

        Ok(Acceptance {
            name: filename.name,
            original_name: meta.filename.clone(),
            size,
            declared_type: declared,
            detected_type: detected,
            sha256: upload.sha256().map(ToString::to_string).unwrap_or_default(),
            warnings,
            validations: checks,
            pdf,
        })
    }
}

fn record(meta: &UploadMeta, upload: &CapturedUpload, verdict: &Verdict) {
    if let Some(declared) = meta.declared_size {
        if !upload.stopped_early() && declared != upload.size() {
            warn!(
                declared_size = declared,
                measured_size = upload.size(),
                "Declared size does not match measured size"
            );
        }
    }

    match verdict {
        Verdict::Accepted(file) => {
            debug!(
                detected_type = %file.detected_type,
                size = file.size,
                sha256 = %file.sha256,
                warnings = file.warnings.len(),
                pdf_version = file.pdf.map(|pdf| field::display(pdf.version)),
                "Upload accepted"
            );
            for warning in &file.warnings {
                info!(%warning, "Upload accepted with warning");
            }
        }
        Verdict::Rejected(rejection) => {
            info!(
                code = %rejection.code,
                size = upload.size(),
                reason = %rejection.message,
                "Upload rejected"
            );
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn human_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else {
        format!("{bytes} bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitSettings;

    const MINIMAL_PDF: &[u8] = b"%PDF-1.4\n\
1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n\
3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>\nendobj\n\
xref\n0 4\n0000000000 65535 f \n0000000009 00000 n \n0000000058 00000 n \n0000000115 00000 n \n\
trailer\n<< /Size 4 /Root 1 0 R >>\nstartxref\n188\n%%EOF\n";

    const PNG: &[u8] = b"\x89PNG\r\n\x1A\n\x00\x00\x00\rIHDR\x00\x00\x00\x01";

    fn validator() -> UploadValidator {
        UploadValidator::new(ValidatorConfig::default()).unwrap()
    }

    fn small_limits() -> ValidatorConfig {
        ValidatorConfig {
            limits: LimitSettings {
                max_file_size: 64,
                max_pdf_size: 512,
                ..LimitSettings::default()
            },
            ..ValidatorConfig::default()
        }
    }

    fn code(verdict: &Verdict) -> Option<RejectCode> {
        verdict.reject_code()
    }

    #[test]
    fn test_accepts_minimal_pdf() {
        let meta = UploadMeta::new("brief.pdf", "application/pdf");
        let Verdict::Accepted(file) = validator().validate_bytes(&meta, MINIMAL_PDF) else {
            panic!("minimal PDF should be accepted");
        };
        assert_eq!(file.detected_type, FormatTag::Pdf);
        assert_eq!(file.size, MINIMAL_PDF.len() as u64);
        assert_eq!(file.sha256.len(), 64);
        assert!(file.warnings.is_empty());
        assert!(file.validations.structure_integrity);
        assert!(file.validations.polyglot_check);
        assert!(file.validations.cross_validation);
        let pdf = file.pdf.unwrap();
        assert_eq!(pdf.version.to_string(), "1.4");
        assert_eq!(pdf.objects, 3);
    }

    #[test]
    fn test_accepts_png_without_pdf_checks() {
        let meta = UploadMeta::new("photo.png", "image/png");
        let Verdict::Accepted(file) = validator().validate_bytes(&meta, PNG) else {
            panic!("PNG should be accepted");
        };
        assert_eq!(file.detected_type, FormatTag::Png);
        assert!(file.validations.magic_number_check);
        assert!(!file.validations.structure_integrity);
        assert!(file.pdf.is_none());
    }

    #[test]
    fn test_empty() {
        let meta = UploadMeta::new("a.pdf", "application/pdf");
        assert_eq!(code(&validator().validate_bytes(&meta, b"")), Some(RejectCode::EmptyFile));
    }

    #[test]
    fn test_size_ceiling_depends_on_declared_type() {
        let validator = UploadValidator::new(small_limits()).unwrap();
        let data = vec![b'x'; 100];

        let png = UploadMeta::new("a.png", "image/png");
        let verdict = validator.validate_bytes(&png, &data);
        assert_eq!(code(&verdict), Some(RejectCode::FileTooLarge));
        assert_eq!(verdict.status(), axum::http::StatusCode::PAYLOAD_TOO_LARGE);

        let pdf = UploadMeta::new("a.pdf", "application/pdf");
        assert_eq!(
            code(&validator.validate_bytes(&pdf, &data)),
            Some(RejectCode::UnrecognizedContent)
        );
    }

    #[test]
    fn test_non_pdf_in_pdf_budget_hits_hard_ceiling() {
        let validator = UploadValidator::new(small_limits()).unwrap();
        let mut data = PNG.to_vec();
        data.resize(200, 0);
        let meta = UploadMeta::new("a.pdf", "application/pdf");
        assert_eq!(
            code(&validator.validate_bytes(&meta, &data)),
            Some(RejectCode::SizeLimitExceededHard)
        );
    }

    #[test]
    fn test_mime_not_allowed() {
        let meta = UploadMeta::new("page.html", "text/html");
        let verdict = validator().validate_bytes(&meta, b"<html></html>");
        assert_eq!(code(&verdict), Some(RejectCode::MimeTypeNotAllowed));
        assert_eq!(verdict.status(), axum::http::StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn test_dangerous_content_wins_over_declared_type() {
        let meta = UploadMeta::new("invoice.pdf", "application/pdf");
        let verdict = validator().validate_bytes(&meta, b"\x7fELF\x02\x01\x01\x00");
        assert_eq!(code(&verdict), Some(RejectCode::DangerousFileType));
        let Verdict::Rejected(rejection) = verdict else {
            unreachable!()
        };
        assert_eq!(rejection.details.unwrap()["detectedType"], "elf");
        assert!(rejection.fingerprint.is_some());
    }

    #[test]
    fn test_unrecognized_content_reports_sniffed_type() {
        let meta = UploadMeta::new("a.png", "image/png");
        let verdict = validator().validate_bytes(&meta, b"ID3\x03\x00\x00\x00\x00\x00\x00");
        let Verdict::Rejected(rejection) = verdict else {
            panic!("should be rejected");
        };
        assert_eq!(rejection.code, RejectCode::UnrecognizedContent);
        assert_eq!(rejection.details.unwrap()["sniffed"], "audio/mpeg");
    }

    #[test]
    fn test_cross_validation_warn_and_strict() {
        let meta = UploadMeta::new("photo.jpg", "image/jpeg");

        let Verdict::Accepted(file) = validator().validate_bytes(&meta, PNG) else {
            panic!("warn policy should accept");
        };
        assert!(!file.validations.cross_validation);
        assert!(file.warnings.iter().any(|w| w.contains("does not match")));

        let mut config = ValidatorConfig::default();
        config.mime.cross_validation = CrossValidationPolicy::Strict;
        let strict = UploadValidator::new(config).unwrap();
        assert_eq!(
            code(&strict.validate_bytes(&meta, PNG)),
            Some(RejectCode::ContentTypeMismatch)
        );
    }

    #[test]
    fn test_filename_policy() {
        let meta = UploadMeta::new("../../etc/brief.pdf", "application/pdf");
        let Verdict::Accepted(file) = validator().validate_bytes(&meta, MINIMAL_PDF) else {
            panic!("sanitize-only policy should accept");
        };
        assert_eq!(file.name, "brief.pdf");
        assert_eq!(file.original_name, "../../etc/brief.pdf");

        let mut config = ValidatorConfig::default();
        config.filenames.reject_unsafe = true;
        let strict = UploadValidator::new(config).unwrap();
        assert_eq!(
            code(&strict.validate_bytes(&meta, MINIMAL_PDF)),
            Some(RejectCode::UnsafeFilename)
        );
    }

    #[test]
    fn test_extension_mismatch_is_a_warning() {
        let meta = UploadMeta::new("brief.docx", "application/pdf");
        let Verdict::Accepted(file) = validator().validate_bytes(&meta, MINIMAL_PDF) else {
            panic!("extension mismatch should only warn");
        };
        assert!(file.warnings.iter().any(|w| w.contains("extension")));
    }

    #[test]
    fn test_declared_type_parameters_are_ignored() {
        let meta = UploadMeta::new("brief.pdf", "Application/PDF; charset=binary");
        let Verdict::Accepted(file) = validator().validate_bytes(&meta, MINIMAL_PDF) else {
            panic!("normalized type should be accepted");
        };
        assert_eq!(file.declared_type, "application/pdf");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = ValidatorConfig::default();
        config.limits.chunk_size = 0;
        assert!(matches!(
            UploadValidator::new(config),
            Err(ValidatorError::Config(_))
        ));
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(20 * 1024 * 1024), "20 MB");
        assert_eq!(human_size(1536 * 1024), "1.5 MB");
        assert_eq!(human_size(512), "512 bytes");
    }

    #[tokio::test]
    async fn test_validate_stream() {
        let chunks: Vec<Result<&[u8], std::io::Error>> =
            MINIMAL_PDF.chunks(7).map(Ok).collect();
        let meta = UploadMeta::new("brief.pdf", "application/pdf");
        let verdict = validator()
            .validate(&meta, futures_util::stream::iter(chunks), &ValidationContext::default())
            .await
            .unwrap();
        assert!(verdict.is_valid());
    }

    #[tokio::test]
    async fn test_validate_reader() {
        let meta = UploadMeta::new("brief.pdf", "application/pdf");
        let verdict = validator()
            .validate_reader(&meta, MINIMAL_PDF, &ValidationContext::default())
            .await
            .unwrap();
        assert!(verdict.is_valid());
    }
}
