//! HTTP route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ServerState>`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::alerts::AlertNotifier;
use crate::engine::Coordinator;
use crate::types::{SessionError, SessionRecord, Signal};

const MAX_TICKER_LEN: usize = 20;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ServerState {
    pub coordinator: Arc<Coordinator>,
    pub notifier: Arc<AlertNotifier>,
}

pub type AppState = Arc<ServerState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub ticker: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub system: &'static str,
    pub participants: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub message: String,
    pub status: &'static str,
    pub consensus: Signal,
    pub confidence: f64,
    pub details: SessionRecord,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeFailure {
    pub message: String,
    pub status: &'static str,
    pub error: &'static str,
    pub details: String,
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
}

/// Trim and uppercase; reject empty or overlong tickers.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let ticker = raw.trim().to_uppercase();
    (!ticker.is_empty() && ticker.chars().count() <= MAX_TICKER_LEN).then_some(ticker)
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "online",
        system: "Multi-Agent Trading Consensus",
        participants: state.coordinator.participant_names(),
    })
}

/// POST /analyze
pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return bad_request("Invalid JSON payload");
    };
    let Some(raw) = request.ticker.filter(|t| !t.is_empty()) else {
        return bad_request("Ticker is required");
    };
    let Some(ticker) = normalize_ticker(&raw) else {
        return bad_request("Invalid ticker format");
    };

    info!(ticker = %ticker, "Analysis requested");

    // Panics escaping the session come back as a JoinError.
    let coordinator = state.coordinator.clone();
    let session_ticker = ticker.clone();
    let outcome = tokio::spawn(async move { coordinator.run_debate(&session_ticker).await })
        .await
        .unwrap_or_else(|e| Err(SessionError::Internal(e.to_string())));

    match outcome {
        Ok(record) => {
            state.notifier.notify(&record).await;
            let body = AnalyzeResponse {
                message: format!("Analysis completed for {ticker}"),
                status: "success",
                consensus: record.decision,
                confidence: record.confidence,
                details: record,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            error!(ticker = %ticker, error = %e, kind = e.kind(), "Analysis failed");
            let body = AnalyzeFailure {
                message: format!("Analysis failed for {ticker}"),
                status: "error",
                error: e.kind(),
                details: e.to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
