//! Shared fixtures for integration tests

#![allow(dead_code)]

use upload_validator::config::ValidatorConfig;
use upload_validator::validation::UploadValidator;

/// Smallest document that passes every PDF check
pub const MINIMAL_PDF: &[u8] = b"%PDF-1.4\n\
1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n\
3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>\nendobj\n\
xref\n0 4\n0000000000 65535 f \n0000000009 00000 n \n0000000058 00000 n \n0000000115 00000 n \n\
trailer\n<< /Size 4 /Root 1 0 R >>\nstartxref\n188\n%%EOF\n";

pub const PNG: &[u8] = b"\x89PNG\r\n\x1A\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\x00\x00\x00\x01";

pub const DOS_EXECUTABLE: &[u8] = b"MZ\x90\x00\x03\x00\x00\x00\x04\x00\x00\x00\xFF\xFF\x00\x00";

/// [`MINIMAL_PDF`] with `extra` spliced in before the xref table
pub fn pdf_with_body(extra: &[u8]) -> Vec<u8> {
    let split = MINIMAL_PDF
        .windows(4)
        .position(|w| w == b"xref")
        .expect("fixture has an xref table");
    let mut data = MINIMAL_PDF[..split].to_vec();
    data.extend_from_slice(extra);
    data.extend_from_slice(&MINIMAL_PDF[split..]);
    data
}

pub fn validator() -> UploadValidator {
    UploadValidator::new(ValidatorConfig::default()).expect("default config is valid")
}
