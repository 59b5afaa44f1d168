//! Integration tests for the Gemini generator against a mock API server.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use briefing::config::BriefingConfig;
use briefing::generator::{BriefingGenerator, GeminiGenerator, GenerationError, PromptOptions};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

// =============================================================================
// Mock Gemini Server
// =============================================================================

/// What the mock answers and what it last received.
struct MockGeminiState {
    status: StatusCode,
    reply: Value,
    last_call: RwLock<Option<String>>,
    last_api_key: RwLock<Option<String>>,
    last_body: RwLock<Option<Value>>,
}

async fn mock_generate(
    State(state): State<Arc<MockGeminiState>>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    *state.last_call.write().await = Some(call);
    *state.last_api_key.write().await = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    *state.last_body.write().await = Some(body);
    (state.status, Json(state.reply.clone()))
}

/// Start a mock Gemini API on a random port.
async fn start_mock_gemini(status: StatusCode, reply: Value) -> (SocketAddr, Arc<MockGeminiState>) {
    let state = Arc::new(MockGeminiState {
        status,
        reply,
        last_call: RwLock::new(None),
        last_api_key: RwLock::new(None),
        last_body: RwLock::new(None),
    });

    let app = Router::new()
        .route("/v1beta/models/{call}", post(mock_generate))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, state)
}

fn generator_for(addr: SocketAddr) -> GeminiGenerator {
    GeminiGenerator::new(PromptOptions::default(), Duration::from_secs(5))
        .unwrap()
        .with_base_url(format!("http://{addr}/v1beta"))
        .with_model("gemini-test")
}

fn config() -> BriefingConfig {
    BriefingConfig {
        api_key: "user-key".into(),
        keywords: vec!["K1".to_string(), "K2".to_string()],
        sources: vec!["S1".to_string()],
        ..Default::default()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_generate_returns_first_candidate_text() {
    let (addr, state) = start_mock_gemini(
        StatusCode::OK,
        json!({
            "candidates": [{ "content": { "parts": [{ "text": "<h1>Briefing</h1>" }] } }]
        }),
    )
    .await;

    let html = generator_for(addr).generate(&config()).await.unwrap();
    assert_eq!(html, "<h1>Briefing</h1>");

    assert_eq!(
        state.last_call.read().await.as_deref(),
        Some("gemini-test:generateContent")
    );
    assert_eq!(state.last_api_key.read().await.as_deref(), Some("user-key"));

    let body = state.last_body.read().await.clone().unwrap();
    assert_eq!(body["tools"], json!([{ "google_search": {} }]));
    let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(prompt.contains("K1, K2"));
    assert!(prompt.contains("S1"));
}

#[tokio::test]
async fn test_generate_without_candidates_is_content_failure() {
    let (addr, _) = start_mock_gemini(StatusCode::OK, json!({ "candidates": [] })).await;

    let err = generator_for(addr).generate(&config()).await.unwrap_err();
    assert!(matches!(err, GenerationError::EmptyResponse));
    assert!(err.is_content_failure());
    assert_eq!(err.to_string(), "Failed to generate the news briefing.");
}

#[tokio::test]
async fn test_generate_upstream_error_carries_message() {
    let (addr, _) = start_mock_gemini(
        StatusCode::BAD_REQUEST,
        json!({ "error": { "code": 400, "message": "API key not valid" } }),
    )
    .await;

    let err = generator_for(addr).generate(&config()).await.unwrap_err();
    match err {
        GenerationError::Upstream { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "API key not valid");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_generate_unreachable_is_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = generator_for(addr).generate(&config()).await.unwrap_err();
    assert!(matches!(err, GenerationError::Transport(_)));
    assert!(!err.is_content_failure());
}
