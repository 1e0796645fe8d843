//! Health check endpoint
//!
//! Reports whether the service accepts validations. The only way to become
//! unhealthy is a shutdown in progress: validations started now would be
//! cancelled immediately.
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use upload_validator::health::health_check;
//! use upload_validator::state::AppState;
//!
//! # fn example() -> anyhow::Result<()> {
//! let app: Router = Router::new()
//!     .route("/health", get(health_check))
//!     .with_state(AppState::new()?);
//! # Ok(())
//! # }
//! ```

use crate::state::AppState;
use crate::validation::signatures::signature_count;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service is healthy and ready
    Healthy,
    /// Service is unhealthy
    Unhealthy,
}

/// Individual component health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component status
    pub status: HealthStatus,
    /// Optional message with details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    /// Create a healthy component with message
    #[must_use]
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: Some(message.into()),
        }
    }

    /// Create an unhealthy component
    #[must_use]
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

/// Overall health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Overall status
    pub status: HealthStatus,
    /// Application version
    pub version: String,
    /// Timestamp of health check (Unix epoch)
    pub timestamp: u64,
    /// Number of magic-number rules loaded
    pub signatures: usize,
    /// Individual component healths
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthCheckResponse {
    /// Create new health check response
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            version: version.into(),
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
            signatures: signature_count(),
            components: BTreeMap::new(),
        }
    }

    /// Add component health
    pub fn add_component(&mut self, name: impl Into<String>, health: ComponentHealth) {
        self.components.insert(name.into(), health);
        self.recalculate_status();
    }

    fn recalculate_status(&mut self) {
        self.status = if self.components.values().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };
    }

    /// Get HTTP status code based on health
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self.status {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for HealthCheckResponse {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

/// Health check handler
#[allow(clippy::unused_async)]
pub async fn health_check(State(state): State<AppState>) -> HealthCheckResponse {
    let mut response = HealthCheckResponse::new(env!("CARGO_PKG_VERSION"));
    let config = state.config();

    response.add_component(
        "validator",
        ComponentHealth::healthy(format!(
            "{} allowed types, max {} bytes ({} bytes for PDF)",
            config.mime.allowed_types.len(),
            config.limits.max_file_size,
            config.limits.max_pdf_size
        )),
    );

    if state.shutdown_token().is_cancelled() {
        response.add_component("lifecycle", ComponentHealth::unhealthy("shutting down"));
    } else {
        response.add_component("lifecycle", ComponentHealth::healthy("accepting uploads"));
    }

    response
}
