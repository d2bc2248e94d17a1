//! HTTP request handlers
//!
//! Implements handlers for:
//! - GET /health: liveness
//! - GET /status: supervisor status
//! - POST /quotes: quote ingest
//! - GET /tickers/{ticker}/metrics/{window}: latest window metrics
//! - GET /tickers/{ticker}/levels: significant price levels
//! - GET /tickers/{ticker}/patterns: recent patterns

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{ApiError, Result};
use crate::orderflow::types::{Pattern, Quote, SignificantLevels, WindowLabel, WindowMetrics};
use crate::service::{ProcessorService, ServiceStatus};
use crate::storage::OrderFlowStore;

/// Default lookback for the patterns endpoint
pub const DEFAULT_PATTERN_WINDOW_SECS: u64 = 300;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Quote and analytics store
    pub store: Arc<dyn OrderFlowStore>,

    /// Processor supervisor (absent when serving reads only)
    pub service: Option<Arc<ProcessorService>>,
}

#[derive(Debug, Deserialize)]
pub struct PatternQuery {
    pub window_secs: Option<u64>,
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> Json<ServiceStatus> {
    match &state.service {
        Some(service) => Json(service.status().await),
        None => Json(ServiceStatus {
            running: false,
            process_interval_secs: 0,
            active_tickers: state.store.active_tickers().await.unwrap_or_default(),
            store_reachable: state.store.ping().await.is_ok(),
            processors: BTreeMap::new(),
        }),
    }
}

/// POST /quotes
///
/// Body: JSON array of quotes. Workers are created for tickers seen for the
/// first time.
pub async fn ingest_quotes(
    State(state): State<AppState>,
    Json(quotes): Json<Vec<Quote>>,
) -> Result<Json<Value>> {
    if let Some(bad) = quotes.iter().position(|q| q.ticker.trim().is_empty()) {
        return Err(ApiError::InvalidRequest(format!(
            "quote at index {} has no ticker",
            bad
        )));
    }

    let recorded = state.store.record_quotes(&quotes).await?;
    tracing::debug!(recorded, "Recorded quotes");

    if let Some(service) = &state.service {
        let mut seen: Vec<&str> = Vec::new();
        for quote in &quotes {
            if !seen.contains(&quote.ticker.as_str()) {
                seen.push(&quote.ticker);
                service.ensure_worker(&quote.ticker).await;
            }
        }
    }

    Ok(Json(json!({ "recorded": recorded })))
}

/// GET /tickers/{ticker}/metrics/{window}
pub async fn window_metrics(
    State(state): State<AppState>,
    Path((ticker, window)): Path<(String, String)>,
) -> Result<Json<WindowMetrics>> {
    let label: WindowLabel = window.parse().map_err(ApiError::InvalidRequest)?;

    state
        .store
        .current_metrics(&ticker, label)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("metrics for {}/{}", ticker, label)))
}

/// GET /tickers/{ticker}/levels
pub async fn significant_levels(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<SignificantLevels>> {
    Ok(Json(state.store.significant_levels(&ticker).await?))
}

/// GET /tickers/{ticker}/patterns?window_secs=N
pub async fn recent_patterns(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<PatternQuery>,
) -> Result<Json<Vec<Pattern>>> {
    let window_secs = query.window_secs.unwrap_or(DEFAULT_PATTERN_WINDOW_SECS);
    if window_secs == 0 {
        return Err(ApiError::InvalidRequest(
            "window_secs must be positive".to_string(),
        ));
    }

    Ok(Json(state.store.recent_patterns(&ticker, window_secs).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use axum::http::StatusCode;
    use chrono::Utc;

    fn state() -> AppState {
        AppState {
            store: Arc::new(MemoryStore::new()),
            service: None,
        }
    }

    #[tokio::test]
    async fn test_ingest_rejects_missing_ticker() {
        let quotes = vec![Quote::new("", 1, 10.0, 10.01, 100, 100)];
        let err = ingest_quotes(State(state()), Json(quotes)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ingest_then_status() {
        let state = state();
        let now = Utc::now().timestamp_millis();
        let quotes = vec![
            Quote::new("AMD", now, 160.0, 160.02, 500, 700),
            Quote::new("AMD", now + 1, 160.0, 160.02, 500, 700),
        ];

        let Json(body) = ingest_quotes(State(state.clone()), Json(quotes)).await.unwrap();
        assert_eq!(body["recorded"], 2);

        let Json(status) = status(State(state)).await;
        assert!(status.store_reachable);
        assert_eq!(status.active_tickers, vec!["AMD".to_string()]);
    }

    #[tokio::test]
    async fn test_metrics_unknown_window_and_missing() {
        let err = window_metrics(State(state()), Path(("AMD".to_string(), "2min".to_string())))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = window_metrics(State(state()), Path(("AMD".to_string(), "10s".to_string())))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_patterns_default_window() {
        let Json(patterns) = recent_patterns(
            State(state()),
            Path("AMD".to_string()),
            Query(PatternQuery { window_secs: None }),
        )
        .await
        .unwrap();
        assert!(patterns.is_empty());
    }
}
