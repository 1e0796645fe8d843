//! Magic-number signature table
//!
//! **Never trust client-provided Content-Type headers alone!** Classification
//! here looks only at content. The table lists both formats the service accepts
//! and formats it refuses outright (executables, scripts, generic archives).
//! Dangerous signatures are always consulted first so that an executable
//! declared as `application/pdf` is caught by its bytes, not its label.
//!
//! # Examples
//!
//! ```rust
//! use upload_validator::validation::signatures::{detect, Detection};
//! use upload_validator::validation::FormatTag;
//!
//! let pe = b"MZ\x90\x00\x03\x00\x00\x00";
//! assert!(matches!(detect(pe, pe), Detection::Dangerous { tag: FormatTag::Exe, .. }));
//!
//! let pdf = b"%PDF-1.7\n";
//! assert_eq!(detect(pdf, pdf), Detection::Allowed(FormatTag::Pdf));
//! ```

use super::types::FormatTag;

const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const ZIP_HEADER_LEN: usize = 30;
const ZIP_DATA_DESCRIPTOR_FLAG: usize = 0x08;
const ZIP_ENTRY_SCAN: usize = 32;

/// Whether a signature identifies an acceptable or a refused format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureClass {
    /// Format may be accepted
    Allowed,
    /// Format is always refused
    Dangerous,
}

/// One magic-number rule
///
/// Every `(offset, bytes)` part must match. Most formats need a single part at
/// offset zero; RIFF-based containers add a second part further in.
#[derive(Debug, Clone, Copy)]
pub struct SignatureRecord {
    /// Format identified by this rule
    pub tag: FormatTag,
    /// Acceptable or refused
    pub class: SignatureClass,
    /// Byte sequences and the offsets they must appear at
    pub parts: &'static [(usize, &'static [u8])],
}

impl SignatureRecord {
    const fn allowed(tag: FormatTag, parts: &'static [(usize, &'static [u8])]) -> Self {
        Self {
            tag,
            class: SignatureClass::Allowed,
            parts,
        }
    }

    const fn dangerous(tag: FormatTag, parts: &'static [(usize, &'static [u8])]) -> Self {
        Self {
            tag,
            class: SignatureClass::Dangerous,
            parts,
        }
    }

    /// Tests the rule against the leading bytes of a file
    #[must_use]
    pub fn matches(&self, header: &[u8]) -> bool {
        self.parts.iter().all(|(offset, magic)| {
            header
                .get(*offset..offset + magic.len())
                .is_some_and(|window| window == *magic)
        })
    }

    /// Number of leading bytes this rule needs to see
    #[must_use]
    pub fn span(&self) -> usize {
        self.parts
            .iter()
            .map(|(offset, magic)| offset + magic.len())
            .max()
            .unwrap_or(0)
    }
}

/// Header rules, dangerous formats first
///
/// [`detect`] takes the first matching record, so no allowed record may sit
/// ahead of a dangerous one.
pub static SIGNATURES: &[SignatureRecord] = &[
    SignatureRecord::dangerous(FormatTag::Exe, &[(0, b"MZ")]),
    SignatureRecord::dangerous(FormatTag::Elf, &[(0, b"\x7fELF")]),
    SignatureRecord::dangerous(FormatTag::Macho, &[(0, b"\xFE\xED\xFA\xCE")]),
    SignatureRecord::dangerous(FormatTag::Macho, &[(0, b"\xFE\xED\xFA\xCF")]),
    SignatureRecord::dangerous(FormatTag::Macho, &[(0, b"\xCE\xFA\xED\xFE")]),
    SignatureRecord::dangerous(FormatTag::Macho, &[(0, b"\xCF\xFA\xED\xFE")]),
    SignatureRecord::dangerous(FormatTag::JavaClass, &[(0, b"\xCA\xFE\xBA\xBE")]),
    SignatureRecord::dangerous(FormatTag::Script, &[(0, b"#!")]),
    SignatureRecord::dangerous(FormatTag::Php, &[(0, b"<?php")]),
    SignatureRecord::dangerous(FormatTag::Wasm, &[(0, b"\x00asm")]),
    SignatureRecord::dangerous(FormatTag::Zip, &[(0, ZIP_LOCAL_HEADER)]),
    SignatureRecord::dangerous(FormatTag::Zip, &[(0, b"PK\x05\x06")]),
    SignatureRecord::dangerous(FormatTag::Rar, &[(0, b"Rar!\x1A\x07")]),
    SignatureRecord::dangerous(FormatTag::SevenZip, &[(0, b"7z\xBC\xAF\x27\x1C")]),
    SignatureRecord::dangerous(FormatTag::Gzip, &[(0, b"\x1F\x8B")]),
    SignatureRecord::dangerous(FormatTag::Bzip2, &[(0, b"BZh")]),
    SignatureRecord::dangerous(FormatTag::Xz, &[(0, b"\xFD7zXZ\x00")]),
    SignatureRecord::dangerous(FormatTag::Cab, &[(0, b"MSCF")]),
    SignatureRecord::allowed(FormatTag::Pdf, &[(0, b"%PDF")]),
    SignatureRecord::allowed(FormatTag::Png, &[(0, b"\x89PNG\r\n\x1A\n")]),
    SignatureRecord::allowed(FormatTag::Jpeg, &[(0, b"\xFF\xD8\xFF")]),
    SignatureRecord::allowed(FormatTag::Gif, &[(0, b"GIF87a")]),
    SignatureRecord::allowed(FormatTag::Gif, &[(0, b"GIF89a")]),
    SignatureRecord::allowed(FormatTag::Webp, &[(0, b"RIFF"), (8, b"WEBP")]),
    SignatureRecord::allowed(FormatTag::Tiff, &[(0, b"II*\x00")]),
    SignatureRecord::allowed(FormatTag::Tiff, &[(0, b"MM\x00*")]),
    SignatureRecord::allowed(FormatTag::Bmp, &[(0, b"BM")]),
    SignatureRecord::allowed(FormatTag::Ole, &[(0, b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1")]),
];

/// Signatures searched for inside a PDF body
///
/// A hit means a second container is hiding in the document. Two-byte
/// signatures such as `MZ` are left out: they occur by chance in compressed
/// streams. The DOS stub message stands in for PE files.
pub static EMBEDDED_SIGNATURES: &[(FormatTag, &str, &[u8])] = &[
    (FormatTag::Zip, "ZIP local file header", ZIP_LOCAL_HEADER),
    (FormatTag::Zip, "ZIP central directory", b"PK\x01\x02"),
    (FormatTag::Zip, "ZIP end of central directory", b"PK\x05\x06"),
    (FormatTag::Exe, "PE/DOS stub", b"This program cannot be run in DOS mode"),
    (FormatTag::Elf, "ELF header", b"\x7fELF"),
    (FormatTag::Macho, "Mach-O header", b"\xFE\xED\xFA\xCE"),
    (FormatTag::Macho, "Mach-O header", b"\xFE\xED\xFA\xCF"),
    (FormatTag::Macho, "Mach-O header", b"\xCE\xFA\xED\xFE"),
    (FormatTag::Macho, "Mach-O header", b"\xCF\xFA\xED\xFE"),
    (FormatTag::Rar, "RAR header", b"Rar!\x1A\x07"),
    (FormatTag::SevenZip, "7-Zip header", b"7z\xBC\xAF\x27\x1C"),
    (FormatTag::Png, "PNG header", b"\x89PNG\r\n\x1A\n"),
    (FormatTag::Gif, "GIF header", b"GIF87a"),
    (FormatTag::Gif, "GIF header", b"GIF89a"),
    (FormatTag::Jpeg, "JPEG header", b"\xFF\xD8\xFF"),
];

/// Number of leading bytes needed to evaluate every header rule
#[must_use]
pub fn required_header_len() -> usize {
    SIGNATURES
        .iter()
        .map(SignatureRecord::span)
        .max()
        .unwrap_or(0)
}

/// Total number of header rules
#[must_use]
pub fn signature_count() -> usize {
    SIGNATURES.len()
}

/// Result of content classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Content matched a refused format
    Dangerous {
        /// Refused format
        tag: FormatTag,
        /// The rule's leading bytes, for diagnostics
        magic: &'static [u8],
    },
    /// Content matched an accepted format
    Allowed(FormatTag),
    /// No rule matched
    Unrecognized,
}

/// Classifies content from its header and captured prefix
///
/// The prefix is only consulted to tell Office Open XML packages apart from
/// arbitrary ZIP archives: both share the `PK\x03\x04` header, but an OOXML
/// package has a `[Content_Types].xml` entry among its first local file headers.
#[must_use]
pub fn detect(header: &[u8], prefix: &[u8]) -> Detection {
    let Some(record) = SIGNATURES.iter().find(|record| record.matches(header)) else {
        return Detection::Unrecognized;
    };

    match record.class {
        SignatureClass::Allowed => Detection::Allowed(record.tag),
        SignatureClass::Dangerous => {
            if record.tag == FormatTag::Zip {
                if let Some(package) = office_package_kind(prefix) {
                    return Detection::Allowed(package);
                }
            }
            Detection::Dangerous {
                tag: record.tag,
                magic: record.parts[0].1,
            }
        }
    }
}

fn office_package_kind(prefix: &[u8]) -> Option<FormatTag> {
    let names = zip_entry_names(prefix);
    if !names.iter().any(|name| *name == b"[Content_Types].xml") {
        return None;
    }
    names.iter().find_map(|name| {
        if name.starts_with(b"word/") {
            Some(FormatTag::Docx)
        } else if name.starts_with(b"xl/") {
            Some(FormatTag::Xlsx)
        } else if name.starts_with(b"ppt/") {
            Some(FormatTag::Pptx)
        } else {
            None
        }
    })
}

/// Entry names from the leading local file headers of a ZIP archive
///
/// Walks header to header through the captured prefix. Entries written with a
/// trailing data descriptor carry no size up front; the walk then resumes at
/// the next local header signature.
fn zip_entry_names(prefix: &[u8]) -> Vec<&[u8]> {
    let mut names = Vec::new();
    let mut offset = 0;

    while names.len() < ZIP_ENTRY_SCAN {
        let Some(header) = prefix.get(offset..offset + ZIP_HEADER_LEN) else {
            break;
        };
        if !header.starts_with(ZIP_LOCAL_HEADER) {
            break;
        }
        let le16 = |at: usize| usize::from(u16::from_le_bytes([header[at], header[at + 1]]));
        let flags = le16(6);
        let compressed = u32::from_le_bytes([header[18], header[19], header[20], header[21]]);
        let name_len = le16(26);
        let extra_len = le16(28);

        let name_start = offset + ZIP_HEADER_LEN;
        let Some(name) = prefix.get(name_start..name_start + name_len) else {
            break;
        };
        names.push(name);

        let data_start = name_start + name_len + extra_len;
        offset = if flags & ZIP_DATA_DESCRIPTOR_FLAG == 0 {
            match usize::try_from(compressed)
                .ok()
                .and_then(|size| data_start.checked_add(size))
            {
                Some(next) => next,
                None => break,
            }
        } else {
            match prefix
                .get(data_start..)
                .and_then(|rest| find_bytes(rest, ZIP_LOCAL_HEADER))
            {
                Some(pos) => data_start + pos,
                None => break,
            }
        };
    }
    names
}

/// Position of the first occurrence of `needle` in `haystack`
#[must_use]
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zip_entry(name: &str, data: &[u8], flags: u16) -> Vec<u8> {
        let size = u32::try_from(data.len()).unwrap();
        let mut entry = ZIP_LOCAL_HEADER.to_vec();
        entry.extend_from_slice(&20u16.to_le_bytes());
        entry.extend_from_slice(&flags.to_le_bytes());
        entry.resize(18, 0);
        let recorded = if flags & 0x08 == 0 { size } else { 0 };
        entry.extend_from_slice(&recorded.to_le_bytes());
        entry.extend_from_slice(&recorded.to_le_bytes());
        entry.extend_from_slice(&u16::try_from(name.len()).unwrap().to_le_bytes());
        entry.extend_from_slice(&0u16.to_le_bytes());
        entry.extend_from_slice(name.as_bytes());
        entry.extend_from_slice(data);
        entry
    }

    fn ooxml_prefix(part: &str) -> Vec<u8> {
        let mut data = zip_entry("[Content_Types].xml", b"<Types/>", 0);
        data.extend(zip_entry("_rels/.rels", b"<Relationships/>", 0));
        data.extend(zip_entry(part, b"<xml/>", 0));
        data
    }

    #[test]
    fn test_detect_pdf() {
        let data = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n";
        assert_eq!(detect(data, data), Detection::Allowed(FormatTag::Pdf));
    }

    #[test]
    fn test_detect_png() {
        let data = b"\x89PNG\r\n\x1A\n\x00\x00\x00\rIHDR";
        assert_eq!(detect(data, data), Detection::Allowed(FormatTag::Png));
    }

    #[test]
    fn test_detect_webp_requires_both_parts() {
        let webp = b"RIFF\x24\x00\x00\x00WEBPVP8 ";
        assert_eq!(detect(webp, webp), Detection::Allowed(FormatTag::Webp));

        let wav = b"RIFF\x24\x00\x00\x00WAVEfmt ";
        assert_eq!(detect(wav, wav), Detection::Unrecognized);
    }

    #[test]
    fn test_detect_executables() {
        for (data, tag) in [
            (&b"MZ\x90\x00"[..], FormatTag::Exe),
            (&b"\x7fELF\x02\x01\x01"[..], FormatTag::Elf),
            (&b"\xCF\xFA\xED\xFE\x07\x00"[..], FormatTag::Macho),
            (&b"#!/bin/sh\n"[..], FormatTag::Script),
        ] {
            assert!(
                matches!(detect(data, data), Detection::Dangerous { tag: t, .. } if t == tag),
                "expected {tag} to be dangerous"
            );
        }
    }

    #[test]
    fn test_plain_zip_is_dangerous() {
        let data = b"PK\x03\x04\x14\x00\x00\x00payload.exe";
        assert!(matches!(
            detect(data, data),
            Detection::Dangerous {
                tag: FormatTag::Zip,
                ..
            }
        ));
    }

    #[test]
    fn test_office_packages_are_allowed() {
        let docx = ooxml_prefix("word/document.xml");
        assert_eq!(detect(&docx, &docx), Detection::Allowed(FormatTag::Docx));

        let xlsx = ooxml_prefix("xl/workbook.xml");
        assert_eq!(detect(&xlsx, &xlsx), Detection::Allowed(FormatTag::Xlsx));

        let pptx = ooxml_prefix("ppt/presentation.xml");
        assert_eq!(detect(&pptx, &pptx), Detection::Allowed(FormatTag::Pptx));
    }

    #[test]
    fn test_zip_mentioning_ooxml_names_in_data_is_dangerous() {
        let mut data = zip_entry(
            "payload.exe",
            b"MZ [Content_Types].xml word/document.xml",
            0,
        );
        data.extend(zip_entry("readme.txt", b"see word/ and [Content_Types].xml", 0));
        assert!(matches!(
            detect(&data, &data),
            Detection::Dangerous {
                tag: FormatTag::Zip,
                ..
            }
        ));
    }

    #[test]
    fn test_office_package_with_data_descriptors() {
        let mut data = zip_entry("[Content_Types].xml", b"<Types/>", 0x08);
        data.extend_from_slice(b"PK\x07\x08\x00\x00\x00\x00\x08\x00\x00\x00\x08\x00\x00\x00");
        data.extend(zip_entry("word/document.xml", b"<w:document/>", 0x08));
        assert_eq!(detect(&data, &data), Detection::Allowed(FormatTag::Docx));
    }

    #[test]
    fn test_content_types_without_office_part_stays_zip() {
        let mut data = zip_entry("[Content_Types].xml", b"<Types/>", 0);
        data.extend(zip_entry("docs/word/notes.txt", b"hello", 0));
        assert!(matches!(detect(&data, &data), Detection::Dangerous { .. }));
    }

    #[test]
    fn test_table_lists_dangerous_first() {
        let first_allowed = SIGNATURES
            .iter()
            .position(|record| record.class == SignatureClass::Allowed)
            .unwrap();
        assert!(SIGNATURES[first_allowed..]
            .iter()
            .all(|record| record.class == SignatureClass::Allowed));
    }

    #[test]
    fn test_unknown_content() {
        assert_eq!(detect(b"hello world", b"hello world"), Detection::Unrecognized);
        assert_eq!(detect(b"", b""), Detection::Unrecognized);
    }

    #[test]
    fn test_short_header_does_not_panic() {
        assert_eq!(detect(b"%", b"%"), Detection::Unrecognized);
        assert_eq!(detect(b"RIFF", b"RIFF"), Detection::Unrecognized);
    }

    #[test]
    fn test_header_window_covers_every_rule() {
        assert!(required_header_len() <= 16);
    }

    #[test]
    fn test_find_bytes() {
        assert_eq!(find_bytes(b"abcabc", b"ca"), Some(2));
        assert_eq!(find_bytes(b"abc", b"abcd"), None);
        assert_eq!(find_bytes(b"abc", b""), None);
    }
}
