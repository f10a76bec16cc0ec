// src/api.rs
//! HTTP trigger surface: one route per stage, plus dashboards.
//!
//! Success is `200 {success: true, ...counts}`; a failed stage is
//! `500 {success: false, error}`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{PipelineError, StoreError};
use crate::model::{AnalysisRole, CreditProvider};
use crate::pipeline::{AnalyzeMode, Pipeline};

const DEFAULT_OUTPUTS_LIMIT: usize = 20;
const MAX_OUTPUTS_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/admin/crawl", get(crawl).post(crawl))
        .route("/admin/extract", get(extract).post(extract))
        .route("/admin/analyze", get(analyze).post(analyze))
        .route("/admin/run-daily", get(run_daily).post(run_daily))
        .route("/admin/credit-balance", post(credit_balance))
        .route("/report/daily", get(report_daily).post(report_daily))
        .route("/usage", get(usage))
        .route("/outputs", get(outputs))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub enum ApiError {
    BadRequest(String),
    Pipeline(PipelineError),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Pipeline(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Pipeline(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(json!({ "success": false, "error": msg }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// `{success: true}` merged with the fields of `body`.
fn success<T: Serialize>(body: &T) -> ApiResult {
    let mut v = serde_json::to_value(body)
        .map_err(|e| ApiError::Pipeline(PipelineError::stage("api", e)))?;
    match v.as_object_mut() {
        Some(obj) => {
            obj.insert("success".into(), Value::Bool(true));
            Ok(Json(v))
        }
        None => Ok(Json(json!({ "success": true, "data": v }))),
    }
}

fn env_present(key: &str) -> bool {
    std::env::var(key).is_ok_and(|v| !v.trim().is_empty())
}

#[derive(Serialize)]
struct HealthChecks {
    store: bool,
    anthropic_key: bool,
    gemini_key: bool,
    mock_mode: bool,
    notification_channels: Vec<&'static str>,
}

async fn health(State(state): State<AppState>) -> Response {
    let store_ok = match state.pipeline.store().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "store ping failed");
            false
        }
    };
    let checks = HealthChecks {
        store: store_ok,
        anthropic_key: env_present("ANTHROPIC_API_KEY"),
        gemini_key: env_present("GEMINI_API_KEY"),
        mock_mode: std::env::var("LLM_TEST_MODE").is_ok_and(|v| v.trim().eq_ignore_ascii_case("mock")),
        notification_channels: state.pipeline.notifier().channel_names(),
    };
    let healthy = checks.store && (checks.mock_mode || checks.anthropic_key);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "checks": checks,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    (status, Json(body)).into_response()
}

async fn crawl(State(state): State<AppState>) -> ApiResult {
    let counts = state.pipeline.run_fetch().await?;
    success(&counts)
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtractParams {
    pub limit: Option<usize>,
}

async fn extract(State(state): State<AppState>, Query(p): Query<ExtractParams>) -> ApiResult {
    let report = state.pipeline.run_extract(p.limit.filter(|n| *n > 0)).await?;
    success(&report)
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeParams {
    pub limit: Option<usize>,
    pub batch_size: Option<usize>,
    pub max_batches: Option<usize>,
}

impl AnalyzeParams {
    /// Batched when either batch parameter is present.
    pub fn mode(&self, cfg: &crate::config::PipelineConfig) -> AnalyzeMode {
        if self.batch_size.is_some() || self.max_batches.is_some() {
            AnalyzeMode::Batched {
                batch_size: self.batch_size.filter(|n| *n > 0).unwrap_or(cfg.analyze_batch_size),
                max_batches: self
                    .max_batches
                    .filter(|n| *n > 0)
                    .unwrap_or(cfg.analyze_max_batches),
            }
        } else {
            AnalyzeMode::Single {
                limit: self.limit.filter(|n| *n > 0).unwrap_or(cfg.analyze_limit),
            }
        }
    }
}

async fn analyze(State(state): State<AppState>, Query(p): Query<AnalyzeParams>) -> ApiResult {
    let mode = p.mode(state.pipeline.config());
    let report = state.pipeline.run_analyze(mode).await?;
    success(&report)
}

async fn run_daily(State(state): State<AppState>) -> ApiResult {
    let run = state.pipeline.run_daily().await?;
    success(&run)
}

async fn report_daily(State(state): State<AppState>) -> ApiResult {
    let report = state.pipeline.run_report().await?;
    success(&report)
}

async fn usage(State(state): State<AppState>) -> ApiResult {
    let cfg = state.pipeline.config();
    let today = crate::dates::today(cfg.offset());
    let metrics = state
        .pipeline
        .store()
        .read_usage_metrics(today, cfg.fallback_balance_usd)
        .await?;
    success(&metrics)
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputsParams {
    pub role: Option<String>,
    pub limit: Option<usize>,
}

async fn outputs(State(state): State<AppState>, Query(p): Query<OutputsParams>) -> ApiResult {
    let role_str = p.role.as_deref().unwrap_or("newspaper");
    let role = AnalysisRole::parse(role_str)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown role: {role_str}")))?;
    let limit = p
        .limit
        .unwrap_or(DEFAULT_OUTPUTS_LIMIT)
        .clamp(1, MAX_OUTPUTS_LIMIT);
    let rows = state.pipeline.store().list_outputs_by_role(role, limit).await?;
    Ok(Json(json!({ "success": true, "role": role, "outputs": rows })))
}

#[derive(Debug, Deserialize)]
pub struct CreditBalanceReq {
    pub provider: String,
    pub balance_usd: f64,
}

async fn credit_balance(
    State(state): State<AppState>,
    Json(req): Json<CreditBalanceReq>,
) -> ApiResult {
    let provider = CreditProvider::parse(&req.provider)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown provider: {}", req.provider)))?;
    if !req.balance_usd.is_finite() || req.balance_usd < 0.0 {
        return Err(ApiError::BadRequest("balance_usd must be a non-negative number".into()));
    }
    let snap = state
        .pipeline
        .store()
        .insert_credit_balance(provider, req.balance_usd)
        .await?;
    success(&snap)
}
