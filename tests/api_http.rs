// tests/api_http.rs
//
// HTTP-level tests for the trigger Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt as _; // for `oneshot`

use insight_pipeline::config::PipelineConfig;
use insight_pipeline::error::LlmError;
use insight_pipeline::llm::{LlmGateway, LlmGateways, MockProvider, PriceTable};
use insight_pipeline::store::{MemoryStore, SharedStore};
use insight_pipeline::{create_router, AppState, NotifierMux, Pipeline};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router(provider: MockProvider) -> Router {
    let store: SharedStore = Arc::new(MemoryStore::new(insight_pipeline::dates::offset_hours(9)));
    let gw = Arc::new(LlmGateway::with_provider(
        Arc::new(provider),
        "claude-3-5-sonnet-20241022",
        PriceTable::default(),
    ));
    let pipeline = Pipeline::new(
        store,
        LlmGateways::single(gw),
        Vec::new(),
        NotifierMux::empty(),
        PipelineConfig::default(),
    );
    create_router(AppState::new(Arc::new(pipeline)))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .clone()
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[serial_test::serial]
#[tokio::test]
async fn health_reflects_credentials() {
    let app = test_router(MockProvider::canned());

    std::env::set_var("LLM_TEST_MODE", "mock");
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["store"], true);

    std::env::remove_var("LLM_TEST_MODE");
    std::env::remove_var("ANTHROPIC_API_KEY");
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn crawl_with_no_sources_is_a_successful_noop() {
    let app = test_router(MockProvider::canned());
    for m in ["GET", "POST"] {
        let (status, body) = call(&app, m, "/admin/crawl", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["fetched"], 0);
        assert_eq!(body["saved"], 0);
    }
}

#[tokio::test]
async fn analyze_batched_parameters_are_honoured() {
    let app = test_router(MockProvider::canned());
    let (status, body) = call(&app, "POST", "/admin/analyze?batch_size=2&max_batches=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["analyzed"], 0);
    assert!(body["trend_output_id"].is_string());

    let (_, outputs) = call(&app, "GET", "/outputs?role=trend", None).await;
    assert_eq!(outputs["outputs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn stage_failure_is_500_with_error_string() {
    let app = test_router(MockProvider::scripted(|_| {
        Err(LlmError::Configuration("Missing ANTHROPIC_API_KEY env var".into()))
    }));
    let (status, body) = call(&app, "GET", "/admin/analyze?limit=5", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("ANTHROPIC_API_KEY"));
}

#[tokio::test]
async fn credit_balance_feeds_usage_dashboard() {
    let app = test_router(MockProvider::canned());

    let (status, _) = call(
        &app,
        "POST",
        "/admin/credit-balance",
        Some(json!({ "provider": "anthropic", "balance_usd": 12.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, usage) = call(&app, "GET", "/usage", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["success"], true);
    assert_eq!(usage["balance"], 12.5);
    assert_eq!(usage["today_calls"], 0);
    // 12.5 USD at the 0.01 floor per report
    assert!(usage["remaining_reports"].as_u64().unwrap() >= 1_249);

    let (status, body) = call(
        &app,
        "POST",
        "/admin/credit-balance",
        Some(json!({ "provider": "openai", "balance_usd": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_output_role_is_rejected() {
    let app = test_router(MockProvider::canned());
    let (status, body) = call(&app, "GET", "/outputs?role=gossip", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown role: gossip");
}
