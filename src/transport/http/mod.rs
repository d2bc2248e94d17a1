//! HTTP transport using Axum
//!
//! Read and ingest API over the order flow store, plus supervisor status.

pub mod error;
pub mod handler;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::config::HttpConfig;
use crate::error::{EngineError, Result};

pub use handler::AppState;

/// Build the API router
pub fn router(state: AppState) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handler::health))
        .route("/status", get(handler::status))
        .route("/quotes", post(handler::ingest_quotes))
        .route(
            "/tickers/{ticker}/metrics/{window}",
            get(handler::window_metrics),
        )
        .route("/tickers/{ticker}/levels", get(handler::significant_levels))
        .route("/tickers/{ticker}/patterns", get(handler::recent_patterns))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server and run until `shutdown` is cancelled
///
/// # Endpoints
/// - GET /health
/// - GET /status
/// - POST /quotes
/// - GET /tickers/{ticker}/metrics/{window}
/// - GET /tickers/{ticker}/levels
/// - GET /tickers/{ticker}/patterns?window_secs=N
pub async fn serve(config: HttpConfig, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!("HTTP server listening on {}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tracing::info!("Shutting down HTTP server...");
        })
        .await
        .map_err(|e| EngineError::Initialization(format!("HTTP server failed: {}", e)))?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
