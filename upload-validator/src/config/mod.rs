//! Configuration management for the upload validator
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `UPLOAD_VALIDATOR_` prefix, `__` for nesting)
//! 2. An explicit file passed with `--config`
//! 3. `./config.toml` (development)
//! 4. `~/.config/upload-validator/config.toml` (user config, XDG)
//! 5. `/etc/upload-validator/config.toml` (system config)
//! 6. Hardcoded defaults (fallback)
//!
//! Environment variable format: `UPLOAD_VALIDATOR_SECTION__FIELD_NAME`
//! - Use `__` (double underscore) to separate the section from the field
//! - Use `_` (single underscore) within field names
//! - Example: `UPLOAD_VALIDATOR_LIMITS__MAX_FILE_SIZE=10485760`
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//! request_timeout_ms = 15000
//! cors_allowed_origins = ["https://intake.example.com"]
//!
//! [limits]
//! max_file_size = 10485760
//!
//! [mime]
//! cross_validation = "strict"
//!
//! [pdf]
//! max_version = "1.7"
//! polyglot_exempt = ["jpeg"]
//! ```
//!
//! # Usage
//!
//! ```rust
//! use upload_validator::config::ValidatorConfig;
//!
//! let config = ValidatorConfig::default();
//! assert_eq!(config.limits.ceiling_for_mime("application/pdf"), 50 * 1024 * 1024);
//! assert_eq!(config.limits.ceiling_for_mime("image/png"), 20 * 1024 * 1024);
//! ```

use crate::validation::{FormatTag, PdfVersion};
use anyhow::{bail, Context};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used under `/etc` and the user config directory
pub const APP_NAME: &str = "upload-validator";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "UPLOAD_VALIDATOR_";

const MIB: u64 = 1024 * 1024;

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to listen on
    pub bind: String,

    /// Per-request validation deadline in milliseconds
    pub request_timeout_ms: u64,

    /// Origins allowed by CORS; `"*"` allows any origin
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            request_timeout_ms: 30_000,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

impl ServerSettings {
    /// Get the request timeout as Duration
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Size ceilings and capture windows, all in bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Ceiling for every declared type except PDF
    pub max_file_size: u64,

    /// Ceiling for uploads declared as `application/pdf`
    pub max_pdf_size: u64,

    /// Largest slice processed per read
    pub chunk_size: usize,

    /// Leading bytes kept for signature matching
    pub header_window: usize,

    /// Trailing bytes kept for `%%EOF` and trailer checks
    pub trailer_window: usize,

    /// Leading bytes kept for PDF body scans
    pub prefix_capture: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_file_size: 20 * MIB,
            max_pdf_size: 50 * MIB,
            chunk_size: 1024 * 1024,
            header_window: 16,
            trailer_window: 1024,
            prefix_capture: 10 * 1024 * 1024,
        }
    }
}

impl LimitSettings {
    /// Ceiling that applies to a declared (normalized) MIME type
    #[must_use]
    pub fn ceiling_for_mime(&self, declared: &str) -> u64 {
        if FormatTag::Pdf.matches_mime(declared) {
            self.max_pdf_size
        } else {
            self.max_file_size
        }
    }

    /// Ceiling that applies to a detected format
    #[must_use]
    pub fn ceiling_for_format(&self, tag: FormatTag) -> u64 {
        if tag == FormatTag::Pdf {
            self.max_pdf_size
        } else {
            self.max_file_size
        }
    }

    /// Request body limit: the largest ceiling plus multipart framing slack
    #[must_use]
    pub fn body_limit(&self) -> usize {
        let largest = self.max_file_size.max(self.max_pdf_size) + MIB;
        usize::try_from(largest).unwrap_or(usize::MAX)
    }
}

/// What to do when detected content disagrees with the declared type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossValidationPolicy {
    /// Record a warning and accept
    #[default]
    Warn,
    /// Reject with `CONTENT_TYPE_MISMATCH`
    Strict,
}

/// Declared MIME type policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MimeSettings {
    /// Declared types accepted by the endpoint
    pub allowed_types: Vec<String>,

    /// Mismatch handling between declared and detected types
    pub cross_validation: CrossValidationPolicy,
}

impl Default for MimeSettings {
    fn default() -> Self {
        Self {
            allowed_types: [
                "application/pdf",
                "image/jpeg",
                "image/png",
                "image/gif",
                "image/webp",
                "image/tiff",
                "image/bmp",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "application/vnd.ms-powerpoint",
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            cross_validation: CrossValidationPolicy::Warn,
        }
    }
}

/// PDF structural checks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfSettings {
    /// Smallest plausible PDF
    pub min_size: u64,

    /// Newest accepted PDF version
    pub max_version: PdfVersion,

    /// Average decompressed bytes per stream before flagging a bomb
    pub max_stream_decompressed: u64,

    /// Cumulative decompressed bytes before flagging a bomb
    pub max_total_decompressed: u64,

    /// Decompressed-to-compressed ratio assumed by the bomb estimate
    pub assumed_expansion_ratio: f64,

    /// Offset the embedded-format scan starts at
    pub polyglot_scan_offset: usize,

    /// Embedded formats tolerated inside a PDF
    pub polyglot_exempt: Vec<FormatTag>,

    /// PDF name objects (without the leading `/`) treated as active content
    pub active_content_markers: Vec<String>,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            min_size: 100,
            max_version: PdfVersion::new(2, 0),
            max_stream_decompressed: 5 * MIB,
            max_total_decompressed: 100 * MIB,
            assumed_expansion_ratio: 1.0,
            polyglot_scan_offset: 16,
            polyglot_exempt: Vec::new(),
            active_content_markers: [
                "JavaScript",
                "JS",
                "Launch",
                "OpenAction",
                "AA",
                "EmbeddedFile",
                "EmbeddedFiles",
                "XObject",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

/// Filename handling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilenameSettings {
    /// Reject names that needed sanitizing instead of only cleaning them
    pub reject_unsafe: bool,
}

/// Complete validator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Size ceilings and capture windows
    #[serde(default)]
    pub limits: LimitSettings,

    /// Declared MIME type policy
    #[serde(default)]
    pub mime: MimeSettings,

    /// PDF structural checks
    #[serde(default)]
    pub pdf: PdfSettings,

    /// Filename handling
    #[serde(default)]
    pub filenames: FilenameSettings,
}

impl ValidatorConfig {
    /// Load configuration from the standard locations
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Default configuration cannot be serialized to TOML
    /// - A configuration file cannot be parsed
    /// - `explicit` is given but does not exist
    /// - The merged configuration fails [`validate`](Self::validate)
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use upload_validator::config::ValidatorConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = ValidatorConfig::load(None)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Self::defaults()?;

        let system_config = PathBuf::from("/etc").join(APP_NAME).join("config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        let user_config = Self::recommended_path();
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        let local_config = PathBuf::from("./config.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        if let Some(path) = explicit {
            if !path.exists() {
                bail!("configuration file {} does not exist", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        Self::finish(figment.merge(Self::env()))
    }

    /// Load configuration from a specific file
    ///
    /// A missing file yields the defaults (plus environment overrides).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the result is invalid.
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let figment = Self::defaults()?
            .merge(Toml::file(path.as_ref()))
            .merge(Self::env());
        Self::finish(figment)
    }

    fn defaults() -> anyhow::Result<Figment> {
        let defaults = toml::to_string(&Self::default())
            .context("failed to serialize default configuration")?;
        Ok(Figment::new().merge(Toml::string(&defaults)))
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).split("__").lowercase(true)
    }

    fn finish(figment: Figment) -> anyhow::Result<Self> {
        let config: Self = figment
            .extract()
            .context("failed to load upload-validator configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Get the recommended XDG config path
    #[must_use]
    pub fn recommended_path() -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./config.toml"),
            |config_dir| config_dir.join(APP_NAME).join("config.toml"),
        )
    }

    /// Create the user config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create_config_dir() -> anyhow::Result<PathBuf> {
        let config_path = Self::recommended_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(config_path)
    }

    /// Check internal consistency
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        let limits = &self.limits;
        if limits.chunk_size == 0 {
            bail!("limits.chunk_size must be greater than zero");
        }
        if limits.header_window < 16 {
            bail!("limits.header_window must be at least 16 bytes");
        }
        if limits.trailer_window == 0 {
            bail!("limits.trailer_window must be greater than zero");
        }
        if limits.prefix_capture < limits.header_window {
            bail!("limits.prefix_capture must be at least limits.header_window");
        }
        if limits.max_file_size == 0 || limits.max_pdf_size == 0 {
            bail!("size ceilings must be greater than zero");
        }
        if self.mime.allowed_types.is_empty() {
            bail!("mime.allowed_types must not be empty");
        }
        if !self.pdf.assumed_expansion_ratio.is_finite() || self.pdf.assumed_expansion_ratio <= 0.0
        {
            bail!("pdf.assumed_expansion_ratio must be a positive number");
        }
        if self
            .pdf
            .active_content_markers
            .iter()
            .any(|marker| marker.is_empty() || marker.starts_with('/'))
        {
            bail!("pdf.active_content_markers must be bare names without a leading '/'");
        }
        Ok(())
    }

    /// Render the configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to serialize configuration")
    }
}
