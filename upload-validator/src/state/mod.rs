//! Application state shared by the HTTP handlers

use crate::config::ValidatorConfig;
use crate::error::ValidatorError;
use crate::validation::{CancellationToken, UploadValidator, ValidationContext};
use std::sync::Arc;

/// Application state for the validation service
///
/// Cheap to clone: the validator is shared behind an `Arc` and the shutdown
/// token is itself a shared handle.
///
/// # Example
///
/// ```rust
/// use upload_validator::state::AppState;
///
/// # fn example() -> anyhow::Result<()> {
/// let state = AppState::new()?;
/// let app = upload_validator::server::router(state);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AppState {
    validator: Arc<UploadValidator>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Create state with the default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the validator cannot be built.
    pub fn new() -> Result<Self, ValidatorError> {
        Self::with_config(ValidatorConfig::default())
    }

    /// Create state with a custom configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_config(config: ValidatorConfig) -> Result<Self, ValidatorError> {
        Ok(Self {
            validator: Arc::new(UploadValidator::new(config)?),
            shutdown: CancellationToken::new(),
        })
    }

    /// Get configuration reference
    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        self.validator.config()
    }

    /// Shared validator
    #[must_use]
    pub fn validator(&self) -> &UploadValidator {
        &self.validator
    }

    /// Token cancelled when the server shuts down
    #[must_use]
    pub const fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Context for one request: the shutdown token plus the request deadline
    #[must_use]
    pub fn request_context(&self) -> ValidationContext {
        ValidationContext::new(self.shutdown.clone())
            .with_timeout(self.config().server.request_timeout())
    }
}
