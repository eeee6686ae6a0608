//! Web server — Axum router for the game page and the spin API.
//!
//! Serves a REST API and a self-contained HTML page. CORS is opt-in via
//! `server.cors_origin`.

pub mod routes;
pub mod session;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use routes::{AppState, SlotsState};

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let spin = post(routes::spin).fallback(routes::method_not_allowed);
    let bet_size = post(routes::set_bet_size).fallback(routes::method_not_allowed);

    Router::new()
        // API routes
        .route("/api/spin", spin.clone())
        .route("/api/spin/", spin)
        .route("/api/bet-size", bet_size)
        .route("/api/state", get(routes::get_state))
        .route("/health", get(routes::health))
        // Game page
        .route("/", get(routes::index))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Allow browser calls from `origin`.
pub fn with_cors(router: Router, origin: &str) -> Result<Router> {
    let origin = origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {origin}"))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);
    Ok(router.layer(cors))
}

/// Bind and serve until Ctrl+C.
pub async fn serve(router: Router, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr, "Slots server listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received.");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
