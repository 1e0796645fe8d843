//! HTTP server assembly
//!
//! [`router`] builds the application with its middleware stack; [`serve`]
//! binds the configured address and runs until Ctrl+C, SIGTERM, or the
//! state's shutdown token fires. On shutdown the token is cancelled first so
//! validations still reading their stream abort instead of holding the
//! connection open.

use crate::handlers::validate_file_upload;
use crate::health::health_check;
use crate::state::AppState;
use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Builds the application router
///
/// Routes:
/// - `POST /validate-file-upload`
/// - `GET /health`
#[must_use]
pub fn router(state: AppState) -> Router {
    let body_limit = state.config().limits.body_limit();
    let cors = cors_layer(&state.config().server.cors_allowed_origins);

    Router::new()
        .route("/validate-file-upload", post(validate_file_upload))
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(%origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Binds the configured address and serves until shutdown
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let bind = state.config().server.bind.clone();
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    serve_on(listener, state).await
}

/// Serves on an already bound listener
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve_on(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    info!("Upload validator listening on http://{}", listener.local_addr()?);

    let token = state.shutdown_token().clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal(&token).await;
            token.cancel();
            info!("Shutting down gracefully");
        })
        .await?;

    Ok(())
}

async fn shutdown_signal(token: &crate::validation::CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received terminate signal"),
        () = token.cancelled() => info!("Shutdown requested"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_route() {
        let app = router(AppState::new().unwrap());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let app = router(AppState::new().unwrap());
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/validate-file-upload")
            .header("origin", "https://portal.example")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            HeaderValue::from_static("*")
        );
    }

    #[test]
    fn test_cors_layer_skips_invalid_origins() {
        let origins = vec!["https://ok.example".to_string(), "bad\norigin".to_string()];
        let _layer = cors_layer(&origins);
    }

    #[tokio::test]
    async fn test_serve_stops_when_token_cancelled() {
        let state = AppState::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let token = state.shutdown_token().clone();

        let server = tokio::spawn(serve_on(listener, state));
        token.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
