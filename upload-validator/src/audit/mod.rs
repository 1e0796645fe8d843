//! Security audit trail
//!
//! The validation pipeline only decides; recording security events is left
//! to whoever called it. Both the HTTP handler and the `check` command route
//! their verdicts through [`report`], so every dangerous or malformed upload
//! leaves exactly one `warn` event on [`AUDIT_TARGET`].

use crate::validation::{UploadMeta, Verdict};

/// Tracing target for security events
pub const AUDIT_TARGET: &str = "upload_validator::audit";

/// Records a verdict in the audit trail
///
/// Only rejections classified as security events are logged. Returns true
/// when an event was emitted.
///
/// # Examples
///
/// ```rust
/// use upload_validator::audit;
/// use upload_validator::config::ValidatorConfig;
/// use upload_validator::validation::{UploadMeta, UploadValidator};
///
/// let validator = UploadValidator::new(ValidatorConfig::default()).unwrap();
/// let meta = UploadMeta::new("invoice.png", "image/png");
/// let verdict = validator.validate_bytes(&meta, b"MZ\x90\x00\x03\x00\x00\x00");
///
/// assert!(audit::report("cli", &meta, &verdict));
/// ```
pub fn report(request_id: &str, meta: &UploadMeta, verdict: &Verdict) -> bool {
    let Verdict::Rejected(rejection) = verdict else {
        return false;
    };
    if !rejection.code.is_security_event() {
        return false;
    }

    let details = rejection
        .details
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();

    tracing::warn!(
        target: AUDIT_TARGET,
        request_id,
        code = rejection.code.as_str(),
        filename = %meta.filename,
        declared_type = %meta.content_type,
        sha256 = rejection.fingerprint.as_deref().unwrap_or("-"),
        details = %details,
        "Security rejection: {}",
        rejection.message
    );
    true
}
