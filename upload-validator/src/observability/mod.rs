//! Observability (logging and tracing)
//!
//! Structured logging via `tracing`. Output goes to stderr so the `check`
//! command can print its JSON verdict on stdout undisturbed.
//!
//! Security rejections are additionally emitted at `warn` on the
//! [`crate::audit::AUDIT_TARGET`] target, which can be routed
//! separately with a filter such as `RUST_LOG=info,upload_validator::audit=warn`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// One JSON object per event
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("info,upload_validator=debug,tower_http=debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

/// Initialize logging
///
/// Sets up:
/// - Pretty formatting in debug builds, JSON in release builds
/// - `RUST_LOG` based level filtering
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
///
/// # Example
///
/// ```rust,no_run
/// use upload_validator::observability;
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init()?;
/// tracing::info!("Validator started");
/// # Ok(())
/// # }
/// ```
pub fn init() -> anyhow::Result<()> {
    init_with(LogFormat::default())
}

/// Initialize logging with an explicit format
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_with(format: LogFormat) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(default_filter());

    match format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format_follows_build_profile() {
        #[cfg(debug_assertions)]
        assert_eq!(LogFormat::default(), LogFormat::Pretty);

        #[cfg(not(debug_assertions))]
        assert_eq!(LogFormat::default(), LogFormat::Json);
    }
}
