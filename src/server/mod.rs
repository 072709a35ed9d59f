//! HTTP surface: an Axum server exposing the debate engine.
//!
//! `POST /analyze` runs one session per request; `GET /status` and
//! `GET /health` report liveness. CORS is open for local tooling.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::future::Future;
use tower_http::cors::CorsLayer;
use tracing::info;

pub use routes::{AppState, ServerState};

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/status", get(routes::get_status))
        .route("/analyze", post(routes::analyze))
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(state: AppState, port: u16, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!(port, "HTTP server listening on http://localhost:{port}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
