//! PDF structural and security checks
//!
//! Runs only for uploads whose content was detected as PDF. All checks work on
//! the bounded capture: the leading prefix (10 MiB by default) and the trailing
//! window. Nothing is decompressed or rendered.
//!
//! Check order, first failure wins:
//!
//! 1. `%PDF-M.m` header
//! 2. version ceiling
//! 3. `%%EOF` in the trailing bytes
//! 4. minimum size
//! 5. compression-bomb estimate
//! 6. embedded foreign containers (polyglots)
//! 7. HTML/script markup
//! 8. active-content names such as `/JavaScript` and `/OpenAction`
//! 9. object balance and cross-reference presence
//!
//! The EOF check runs before the size floor so a truncated document is always
//! reported as truncated, however short it is.
//!
//! # Limitations
//!
//! Scans cover the captured prefix and trailer only. Content hidden in the
//! middle of a document larger than the prefix, or inside compressed streams,
//! is not seen.

use super::capture::CapturedUpload;
use super::signatures::{find_bytes, EMBEDDED_SIGNATURES};
use super::types::{FormatTag, RejectCode, Rejection};
use crate::config::PdfSettings;
use crate::error::ValidatorError;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const PDF_DELIMITERS: &str = r"\x00\t\n\x0C\r /\[\]<>()\{\}%";
const PDF_DELIMITER_BYTES: &[u8] = b"\x00\t\n\x0C\r /[]<>(){}%";
const DCT_LOOKBEHIND: usize = 1024;

/// A `major.minor` PDF version
///
/// Ordered numerically, so `1.10` sorts after `1.7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PdfVersion {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
}

impl PdfVersion {
    /// Creates a version
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Error parsing a [`PdfVersion`]
#[derive(Debug, Clone, Error)]
#[error("invalid PDF version {0:?}, expected MAJOR.MINOR")]
pub struct ParseVersionError(String);

impl FromStr for PdfVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| ParseVersionError(s.to_string()))?;
        let parse = |part: &str| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseVersionError(s.to_string()));
            }
            part.parse::<u8>().map_err(|_| ParseVersionError(s.to_string()))
        };
        Ok(Self::new(parse(major)?, parse(minor)?))
    }
}

impl TryFrom<String> for PdfVersion {
    type Error = ParseVersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PdfVersion> for String {
    fn from(version: PdfVersion) -> Self {
        version.to_string()
    }
}

/// What the checks measured on an accepted PDF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfReport {
    /// Version from the header
    pub version: PdfVersion,
    /// Compressed-stream count found in the prefix
    pub compressed_streams: usize,
    /// `N N obj` count found in the prefix
    pub objects: usize,
}

/// Compiled PDF checks
///
/// Build once per validator and share; all scanners are compiled up front.
#[derive(Debug, Clone)]
pub struct PdfInspector {
    settings: PdfSettings,
    header: Regex,
    filters: Regex,
    embedded: Option<Regex>,
    embedded_needles: Vec<(FormatTag, &'static str, &'static [u8])>,
    markup: Regex,
    active: Regex,
    escaped_name: Regex,
    active_names: HashSet<Vec<u8>>,
    object: Regex,
    endobj: Regex,
}

/// A slice of the upload and its absolute offset
#[derive(Clone, Copy)]
struct Region<'a> {
    base: u64,
    bytes: &'a [u8],
}

fn regions(upload: &CapturedUpload) -> Vec<Region<'_>> {
    let mut regions = vec![Region {
        base: 0,
        bytes: upload.prefix(),
    }];
    if upload.prefix_truncated() {
        let trailer = upload.trailer();
        regions.push(Region {
            base: upload.size() - trailer.len() as u64,
            bytes: trailer,
        });
    }
    regions
}

fn hex_escape(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\x{b:02X}")).collect()
}

fn compile(pattern: &str) -> Result<Regex, ValidatorError> {
    Regex::new(pattern)
        .map_err(|e| ValidatorError::Config(format!("invalid scanner pattern: {e}")))
}

/// Decodes `#xx` escapes in a PDF name token (without the leading `/`)
fn decode_name(raw: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' {
            if let Some(byte) = raw
                .get(i + 1..i + 3)
                .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(raw[i]);
        i += 1;
    }
    decoded
}

/// Whether a JPEG signature at `pos` is the first byte of a `/DCTDecode` stream
fn starts_dct_stream(bytes: &[u8], pos: usize) -> bool {
    let before = &bytes[..pos];
    let before = before
        .strip_suffix(b"\r\n")
        .or_else(|| before.strip_suffix(b"\n"))
        .or_else(|| before.strip_suffix(b"\r"))
        .unwrap_or(before);
    if !before.ends_with(b"stream") || before.ends_with(b"endstream") {
        return false;
    }
    let dict_start = before.len().saturating_sub(DCT_LOOKBEHIND);
    find_bytes(&before[dict_start..], b"/DCTDecode").is_some()
}

impl PdfInspector {
    /// Compiles the scanners for the given settings
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError::Config`] if a configured marker produces an
    /// invalid pattern.
    pub fn new(settings: &PdfSettings) -> Result<Self, ValidatorError> {
        let embedded_needles: Vec<_> = EMBEDDED_SIGNATURES
            .iter()
            .copied()
            .filter(|(tag, _, _)| !settings.polyglot_exempt.contains(tag))
            .collect();
        let embedded = if embedded_needles.is_empty() {
            None
        } else {
            let alternation: Vec<String> = embedded_needles
                .iter()
                .map(|(_, _, magic)| hex_escape(magic))
                .collect();
            Some(compile(&format!("(?-u){}", alternation.join("|")))?)
        };

        let markers: Vec<String> = settings
            .active_content_markers
            .iter()
            .map(|marker| regex::escape(marker))
            .collect();
        let active = compile(&format!(
            r"(?-u)/(?:{})(?:[{PDF_DELIMITERS}]|\z)",
            markers.join("|")
        ))?;

        Ok(Self {
            settings: settings.clone(),
            header: compile(r"(?-u)\A%PDF-(\d+)\.(\d+)")?,
            filters: compile(r"(?-u)/(?:FlateDecode|LZWDecode|RunLengthDecode|JBIG2Decode)\b")?,
            embedded,
            embedded_needles,
            markup: compile(r"(?i-u)<script|<iframe|<object|<embed|javascript:|vbscript:")?,
            active,
            escaped_name: compile(&format!(
                r"(?-u)/[^{PDF_DELIMITERS}]*#[0-9A-Fa-f]{{2}}[^{PDF_DELIMITERS}]*"
            ))?,
            active_names: settings
                .active_content_markers
                .iter()
                .map(|marker| marker.as_bytes().to_vec())
                .collect(),
            object: compile(r"(?-u)\b\d+\s+\d+\s+obj\b")?,
            endobj: compile(r"(?-u)\bendobj\b")?,
        })
    }

    /// Runs every check in order
    ///
    /// # Errors
    ///
    /// Returns the first failing check's [`Rejection`].
    pub fn inspect(&self, upload: &CapturedUpload) -> Result<PdfReport, Rejection> {
        let version = self.check_header(upload.header())?;
        self.check_version(version)?;
        Self::check_eof(upload.trailer())?;
        self.check_min_size(upload.size())?;
        let compressed_streams = self.check_compression_bomb(upload)?;
        self.check_polyglot(upload)?;
        self.check_script_smuggling(upload)?;
        self.check_active_content(upload)?;
        let objects = self.check_structure(upload)?;
        Ok(PdfReport {
            version,
            compressed_streams,
            objects,
        })
    }

    /// Parses the `%PDF-M.m` header
    ///
    /// # Errors
    ///
    /// `MALFORMED_PDF_HEADER` when the header is missing or unparseable.
    pub fn check_header(&self, header: &[u8]) -> Result<PdfVersion, Rejection> {
        let malformed = || {
            Rejection::new(
                RejectCode::MalformedPdfHeader,
                "PDF header is malformed: expected %PDF- followed by a version number",
            )
            .with_details(json!({ "header": String::from_utf8_lossy(header) }))
        };

        let captures = self.header.captures(header).ok_or_else(malformed)?;
        let part = |i: usize| {
            captures
                .get(i)
                .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
                .and_then(|s| s.parse::<u8>().ok())
        };
        match (part(1), part(2)) {
            (Some(major), Some(minor)) => Ok(PdfVersion::new(major, minor)),
            _ => Err(malformed()),
        }
    }

    /// Enforces the version ceiling
    ///
    /// # Errors
    ///
    /// `PDF_VERSION_UNSUPPORTED` above `pdf.max_version`.
    pub fn check_version(&self, version: PdfVersion) -> Result<(), Rejection> {
        if version > self.settings.max_version {
            return Err(Rejection::new(
                RejectCode::PdfVersionUnsupported,
                format!(
                    "PDF version {version} is not supported (maximum {})",
                    self.settings.max_version
                ),
            )
            .with_details(json!({
                "version": version.to_string(),
                "maxVersion": self.settings.max_version.to_string(),
            })));
        }
        Ok(())
    }

    /// Requires `%%EOF` in the trailing bytes
    ///
    /// # Errors
    ///
    /// `MALFORMED_PDF_EOF` when the marker is absent.
    pub fn check_eof(trailer: &[u8]) -> Result<(), Rejection> {
        if find_bytes(trailer, b"%%EOF").is_none() {
            return Err(Rejection::new(
                RejectCode::MalformedPdfEof,
                "PDF is missing the %%EOF marker; the file appears truncated or corrupted",
            )
            .with_details(json!({ "trailerBytesChecked": trailer.len() })));
        }
        Ok(())
    }

    /// Enforces the minimum plausible size
    ///
    /// # Errors
    ///
    /// `STRUCTURAL_CORRUPTION` below `pdf.min_size`.
    pub fn check_min_size(&self, size: u64) -> Result<(), Rejection> {
        if size < self.settings.min_size {
            return Err(Rejection::new(
                RejectCode::StructuralCorruption,
                format!(
                    "PDF is too small to be valid ({size} bytes, minimum {})",
                    self.settings.min_size
                ),
            )
            .with_details(json!({ "size": size, "minSize": self.settings.min_size })));
        }
        Ok(())
    }

    /// Estimates decompressed volume from the compressed-stream count
    ///
    /// The average is the full measured size spread over the filters seen in
    /// the prefix. Returns that filter count.
    ///
    /// # Errors
    ///
    /// `SUSPECTED_COMPRESSION_BOMB` when the per-stream average or the total
    /// estimate exceeds its limit.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn check_compression_bomb(&self, upload: &CapturedUpload) -> Result<usize, Rejection> {
        let counted = self.filters.find_iter(upload.prefix()).count();
        let size = upload.size() as f64;

        // Streams past the prefix are not counted; the average stays tied to
        // the full size.
        let streams = counted as f64;
        let cumulative = size * self.settings.assumed_expansion_ratio;
        let average = if streams > 0.0 { cumulative / streams } else { 0.0 };

        let per_stream_limit = self.settings.max_stream_decompressed as f64;
        let total_limit = self.settings.max_total_decompressed as f64;
        if (streams > 0.0 && average > per_stream_limit) || cumulative > total_limit {
            return Err(Rejection::new(
                RejectCode::SuspectedCompressionBomb,
                "PDF compressed streams suggest excessive decompressed size",
            )
            .with_details(json!({
                "compressedStreams": streams as u64,
                "estimatedTotal": cumulative as u64,
                "estimatedAverage": average as u64,
                "maxStreamDecompressed": self.settings.max_stream_decompressed,
                "maxTotalDecompressed": self.settings.max_total_decompressed,
            })));
        }
        Ok(counted)
    }

    /// Searches for other container formats inside the document
    ///
    /// JPEG data that opens a `/DCTDecode` stream is ordinary image content and
    /// is skipped.
    ///
    /// # Errors
    ///
    /// `POLYGLOT_DETECTED` with the embedded format and its offset.
    pub fn check_polyglot(&self, upload: &CapturedUpload) -> Result<(), Rejection> {
        let Some(embedded) = &self.embedded else {
            return Ok(());
        };
        let scan_offset = self.settings.polyglot_scan_offset as u64;

        for region in regions(upload) {
            let skip = usize::try_from(scan_offset.saturating_sub(region.base))
                .unwrap_or(usize::MAX)
                .min(region.bytes.len());
            let haystack = &region.bytes[skip..];

            for hit in embedded.find_iter(haystack) {
                let Some((tag, label, _)) = self
                    .embedded_needles
                    .iter()
                    .find(|(_, _, magic)| hit.as_bytes() == *magic)
                else {
                    continue;
                };
                let pos = skip + hit.start();
                if *tag == FormatTag::Jpeg && starts_dct_stream(region.bytes, pos) {
                    continue;
                }
                return Err(Rejection::new(
                    RejectCode::PolyglotDetected,
                    format!("PDF contains an embedded {} ({label})", tag.description()),
                )
                .with_details(json!({
                    "embeddedType": tag.as_str(),
                    "signature": label,
                    "offset": region.base + pos as u64,
                })));
            }
        }
        Ok(())
    }

    /// Searches for HTML/script markup
    ///
    /// # Errors
    ///
    /// `SCRIPT_SMUGGLING_DETECTED` with the matched marker.
    pub fn check_script_smuggling(&self, upload: &CapturedUpload) -> Result<(), Rejection> {
        for region in regions(upload) {
            if let Some(hit) = self.markup.find(region.bytes) {
                return Err(Rejection::new(
                    RejectCode::ScriptSmugglingDetected,
                    "PDF contains embedded script or HTML markup",
                )
                .with_details(json!({
                    "marker": String::from_utf8_lossy(hit.as_bytes()),
                    "offset": region.base + hit.start() as u64,
                })));
            }
        }
        Ok(())
    }

    /// Searches for active-content names, including `#xx`-escaped spellings
    ///
    /// # Errors
    ///
    /// `ACTIVE_CONTENT_DETECTED` with the matched name.
    pub fn check_active_content(&self, upload: &CapturedUpload) -> Result<(), Rejection> {
        let reject = |name: &[u8], offset: u64, obfuscated: bool| {
            let name = String::from_utf8_lossy(name).into_owned();
            Rejection::new(
                RejectCode::ActiveContentDetected,
                format!("PDF contains active content (/{name})"),
            )
            .with_details(json!({
                "marker": name,
                "offset": offset,
                "obfuscated": obfuscated,
            }))
        };

        for region in regions(upload) {
            if let Some(hit) = self.active.find(region.bytes) {
                let name = hit.as_bytes()[1..]
                    .split(|b| PDF_DELIMITER_BYTES.contains(b))
                    .next()
                    .unwrap_or_default();
                return Err(reject(name, region.base + hit.start() as u64, false));
            }
            for hit in self.escaped_name.find_iter(region.bytes) {
                let decoded = decode_name(&hit.as_bytes()[1..]);
                if self.active_names.contains(&decoded) {
                    return Err(reject(&decoded, region.base + hit.start() as u64, true));
                }
            }
        }
        Ok(())
    }

    /// Checks object balance and cross-reference presence
    ///
    /// Returns the object count.
    ///
    /// # Errors
    ///
    /// `STRUCTURAL_CORRUPTION` describing what is missing or unbalanced.
    pub fn check_structure(&self, upload: &CapturedUpload) -> Result<usize, Rejection> {
        let prefix = upload.prefix();
        let trailer = upload.trailer();
        let objects = self.object.find_iter(prefix).count();
        let endobjs = self.endobj.find_iter(prefix).count();
        let tolerance = usize::from(upload.prefix_truncated());

        let has = |needle: &[u8]| {
            find_bytes(prefix, needle).is_some() || find_bytes(trailer, needle).is_some()
        };
        let has_xref = has(b"xref");
        let has_trailer = has(b"trailer") || has(b"/XRef");

        let problem = if objects == 0 {
            Some("PDF contains no objects")
        } else if objects.abs_diff(endobjs) > tolerance {
            Some("PDF object and endobj counts do not match")
        } else if !has_xref {
            Some("PDF is missing its cross-reference table")
        } else if !has_trailer {
            Some("PDF is missing its trailer")
        } else {
            None
        };

        if let Some(message) = problem {
            return Err(Rejection::new(RejectCode::StructuralCorruption, message).with_details(
                json!({
                    "objects": objects,
                    "endobjs": endobjs,
                    "xref": has_xref,
                    "trailer": has_trailer,
                }),
            ));
        }
        Ok(objects)
    }
}
