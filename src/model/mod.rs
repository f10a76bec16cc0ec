//! Domain records persisted by the content store.
//!
//! Everything except the counters is immutable once written. `New*` structs are
//! what callers hand to the store; the store assigns ids and timestamps.

pub mod outputs;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub use outputs::{
    ActionItem, Classification, ContentType, StrategyPlan, StructuredOutput, TrendDigest,
    TrendItem,
};

/// Extract reference used by aggregate outputs when the batch was empty.
pub const SENTINEL_EXTRACT_ID: Uuid = Uuid::nil();

pub const EXTRACTOR_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    PressRelease,
    Media,
    CompanySite,
    Social,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::PressRelease => "press_release",
            SourceType::Media => "media",
            SourceType::CompanySite => "company_site",
            SourceType::Social => "social",
        }
    }

    /// Image-heavy sources go through the LLM extraction path.
    pub fn prefers_llm_extraction(&self) -> bool {
        matches!(self, SourceType::Social | SourceType::PressRelease)
    }

    pub fn trend_source(&self) -> TrendSource {
        match self {
            SourceType::Social => TrendSource::Sns,
            SourceType::CompanySite => TrendSource::Company,
            SourceType::PressRelease | SourceType::Media => TrendSource::Media,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    Rule,
    Llm,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisRole {
    Classify,
    Compare,
    Trend,
    Strategy,
    Newspaper,
}

impl AnalysisRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisRole::Classify => "classify",
            AnalysisRole::Compare => "compare",
            AnalysisRole::Trend => "trend",
            AnalysisRole::Strategy => "strategy",
            AnalysisRole::Newspaper => "newspaper",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classify" => Some(AnalysisRole::Classify),
            "compare" => Some(AnalysisRole::Compare),
            "trend" => Some(AnalysisRole::Trend),
            "strategy" => Some(AnalysisRole::Strategy),
            "newspaper" => Some(AnalysisRole::Newspaper),
            _ => None,
        }
    }
}

/// Coarse origin bucket for trend counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendSource {
    Sns,
    Media,
    Company,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditProvider {
    Anthropic,
    Google,
}

impl CreditProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(CreditProvider::Anthropic),
            "google" | "gemini" => Some(CreditProvider::Google),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContent {
    pub id: Uuid,
    pub source_type: SourceType,
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub content: String,
    pub content_hash: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRawContent {
    pub source_type: SourceType,
    pub url: String,
    pub content: String,
    pub content_hash: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(default, alias = "alt")]
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub id: Uuid,
    pub raw_content_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    pub extractor_used: ExtractorKind,
    pub extractor_version: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExtract {
    pub raw_content_id: Uuid,
    pub text: String,
    pub tables: Vec<String>,
    pub images: Vec<ImageRef>,
    pub extractor_used: ExtractorKind,
    pub extractor_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub id: Uuid,
    pub extracted_text_id: Uuid,
    pub role: AnalysisRole,
    pub model_name: String,
    pub output_markdown: Option<String>,
    pub output_structured: Option<StructuredOutput>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalysisOutput {
    pub extracted_text_id: Uuid,
    pub role: AnalysisRole,
    pub model_name: String,
    pub output_markdown: Option<String>,
    pub output_structured: Option<StructuredOutput>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendCounter {
    pub date: NaiveDate,
    pub keyword: String,
    pub source: TrendSource,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub day: NaiveDate,
    pub model_name: String,
    pub calls: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBalanceSnapshot {
    pub provider: CreditProvider,
    pub captured_at: DateTime<Utc>,
    pub balance_usd: f64,
}

/// Cost dashboard figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UsageMetrics {
    pub today_cost: f64,
    pub today_tokens_in: u64,
    pub today_tokens_out: u64,
    pub today_calls: u64,
    pub avg_7d_cost: f64,
    pub balance: f64,
    pub remaining_reports: u64,
    pub month_total: f64,
}

/// Round to `places` decimals (half away from zero).
pub fn round_to(v: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (v * f).round() / f
}
