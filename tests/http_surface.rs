//! HTTP surface exercised through the router, without binding a port.

mod common;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tower::ServiceExt;

use common::{engine, RecordingMemory, ScriptedParticipant, StaticFeed};
use quorum::alerts::AlertNotifier;
use quorum::data::MarketDataProvider;
use quorum::engine::Coordinator;
use quorum::participants::Participant;
use quorum::server::{build_router, AppState, ServerState};
use quorum::types::{MarketSnapshot, Signal};

/// Feed whose every call panics, to exercise the catch-all path.
struct PanickingFeed;

#[async_trait]
impl MarketDataProvider for PanickingFeed {
    async fn get_market_data(&self, _ticker: &str) -> Result<MarketSnapshot> {
        panic!("feed exploded")
    }

    async fn get_news(&self, _ticker: &str) -> Result<Vec<String>> {
        Ok(vec![])
    }
}

fn state_with(feed: Arc<dyn MarketDataProvider>) -> AppState {
    let pool: Vec<Arc<dyn Participant>> = vec![
        Arc::new(ScriptedParticipant::steady("ChatGPT Agent", 1.0, Signal::Buy, 0.9)),
        Arc::new(ScriptedParticipant::steady("Gemini Agent", 1.2, Signal::Buy, 0.8)),
    ];
    let coordinator = Coordinator::new(
        pool,
        feed,
        Arc::new(RecordingMemory::new("No historical context available.")),
        engine(5),
    );
    Arc::new(ServerState {
        coordinator: Arc::new(coordinator),
        notifier: Arc::new(AlertNotifier::new(None, None, 0.7, None).unwrap()),
    })
}

fn analyze(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/analyze")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_analyze_returns_full_record() {
    let app = build_router(state_with(Arc::new(StaticFeed::ok())));
    let resp = app.oneshot(analyze(r#"{"ticker":"eth-usd"}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = json_body(resp).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["consensus"], "BUY");
    assert_eq!(json["details"]["ticker"], "ETH-USD");
    assert_eq!(json["details"]["rounds"], 0);
    assert_eq!(json["details"]["termination"], "consensus");
    assert!(json["details"]["history"].as_array().unwrap().is_empty());
    assert_eq!(json["details"]["market_data"]["ticker"], "ETH-USD");
}

#[tokio::test]
async fn test_data_fetch_failure_maps_to_500() {
    let app = build_router(state_with(Arc::new(StaticFeed::failing("upstream 503"))));
    let resp = app.oneshot(analyze(r#"{"ticker":"BTC-USD"}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = json_body(resp).await;
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"], "data_fetch");
    assert_eq!(json["message"], "Analysis failed for BTC-USD");
    assert!(json["details"].as_str().unwrap().contains("upstream 503"));
}

#[tokio::test]
async fn test_escaped_panic_maps_to_internal() {
    let app = build_router(state_with(Arc::new(PanickingFeed)));
    let resp = app.oneshot(analyze(r#"{"ticker":"BTC-USD"}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(resp).await["error"], "internal");
}

#[tokio::test]
async fn test_invalid_requests_are_400() {
    let long = format!(r#"{{"ticker":"{}"}}"#, "Z".repeat(25));
    for body in ["{", r#"{"symbol":"BTC"}"#, r#"{"ticker":""}"#, long.as_str()] {
        let app = build_router(state_with(Arc::new(StaticFeed::ok())));
        let resp = app.oneshot(analyze(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {body}");
    }
}

#[tokio::test]
async fn test_status_lists_participants() {
    let app = build_router(state_with(Arc::new(StaticFeed::ok())));
    let resp = app
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = json_body(resp).await;
    assert_eq!(json["status"], "online");
    assert_eq!(json["participants"], serde_json::json!(["ChatGPT Agent", "Gemini Agent"]));
}
