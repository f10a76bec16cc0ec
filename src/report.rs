// src/report.rs
//! Daily newspaper: gather the last day's outputs, one LLM call, persist,
//! then hand a short summary to the notifier.

use std::sync::Arc;

use chrono::{Duration, FixedOffset, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analyze::prompts;
use crate::error::{truncate_chars, PipelineError};
use crate::llm::{LlmGateway, LlmRequest};
use crate::model::{
    AnalysisOutput, AnalysisRole, NewAnalysisOutput, StrategyPlan, TrendDigest, UsageMetrics,
    SENTINEL_EXTRACT_ID,
};
use crate::notify::{Notice, NotifierMux, ReportNotice};
use crate::store::SharedStore;

pub const NEWSPAPER_MAX_TOKENS: u32 = 8000;
const TOP_STORIES: usize = 3;
const SUMMARY_LINES: usize = 3;
const SUMMARY_MAX_CHARS: usize = 600;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryRef {
    pub company: String,
    pub product: Option<String>,
    pub specs: Vec<String>,
    pub source_url: Option<String>,
}

/// Everything the newspaper prompt sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportMaterial {
    pub date: String,
    pub top_stories: Vec<StoryRef>,
    pub trend: Option<TrendDigest>,
    pub comparisons: Vec<String>,
    pub strategy: Option<StrategyPlan>,
    #[serde(skip)]
    pub anchor: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub output_id: Uuid,
    pub markdown: String,
    pub chat_summary: String,
    pub cost_usd: f64,
    pub stories: usize,
    pub delivered: usize,
}

/// First three non-heading lines (600 chars max) plus a cost line.
pub fn chat_summary(markdown: &str, usage: &UsageMetrics) -> String {
    let lead = markdown
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .take(SUMMARY_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\n\n💰 Today: ${:.4} / Balance: ${:.2} / Remaining reports: {}",
        truncate_chars(&lead, SUMMARY_MAX_CHARS),
        usage.today_cost,
        usage.balance,
        usage.remaining_reports
    )
}

pub struct Reporter {
    store: SharedStore,
    gateway: Arc<LlmGateway>,
    notifier: NotifierMux,
    offset: FixedOffset,
    fallback_balance: f64,
    web_url: Option<String>,
}

impl Reporter {
    pub fn new(
        store: SharedStore,
        gateway: Arc<LlmGateway>,
        notifier: NotifierMux,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            offset,
            fallback_balance: 5.0,
            web_url: None,
        }
    }

    pub fn fallback_balance(mut self, usd: f64) -> Self {
        self.fallback_balance = usd;
        self
    }

    pub fn web_url(mut self, url: Option<String>) -> Self {
        self.web_url = url;
        self
    }

    async fn source_url(&self, out: &AnalysisOutput) -> Option<String> {
        let ex = self.store.get_extract(out.extracted_text_id).await.ok()??;
        let raw = self.store.get_raw(ex.raw_content_id).await.ok()??;
        Some(raw.url)
    }

    /// Outputs of the last 24 hours, newest first per role.
    pub async fn gather(&self) -> Result<ReportMaterial, PipelineError> {
        let since = Utc::now() - Duration::hours(24);
        let recent = self.store.list_recent_outputs(since).await?;

        let mut material = ReportMaterial {
            date: crate::dates::today(self.offset).to_string(),
            ..Default::default()
        };
        for out in recent.iter().filter(|o| o.role == AnalysisRole::Classify) {
            if material.top_stories.len() == TOP_STORIES {
                break;
            }
            let Some(c) = out.output_structured.as_ref().and_then(|s| s.as_classification())
            else {
                continue;
            };
            material.anchor.get_or_insert(out.extracted_text_id);
            material.top_stories.push(StoryRef {
                company: c.company.clone(),
                product: c.product.clone(),
                specs: c.specs.clone(),
                source_url: self.source_url(out).await,
            });
        }
        material.trend = recent
            .iter()
            .filter(|o| o.role == AnalysisRole::Trend)
            .find_map(|o| o.output_structured.as_ref()?.as_trend().cloned());
        material.strategy = recent
            .iter()
            .filter(|o| o.role == AnalysisRole::Strategy)
            .find_map(|o| o.output_structured.as_ref()?.as_strategy().cloned());
        material.comparisons = recent
            .iter()
            .filter(|o| o.role == AnalysisRole::Compare)
            .filter_map(|o| o.output_markdown.clone())
            .collect();
        Ok(material)
    }

    /// Generate, persist and deliver today's newspaper.
    pub async fn generate(&self) -> Result<DailyReport, PipelineError> {
        let material = self.gather().await?;
        let material_json =
            serde_json::to_string(&material).map_err(|e| PipelineError::stage("report", e))?;

        let resp = self
            .gateway
            .invoke(
                LlmRequest::new(prompts::newspaper(&material.date, &material_json))
                    .system(prompts::SYSTEM)
                    .max_tokens(NEWSPAPER_MAX_TOKENS),
            )
            .await?;

        let stored = self
            .store
            .insert_output(NewAnalysisOutput {
                extracted_text_id: material.anchor.unwrap_or(SENTINEL_EXTRACT_ID),
                role: AnalysisRole::Newspaper,
                model_name: resp.model.clone(),
                output_markdown: Some(resp.text.clone()),
                output_structured: None,
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                cost_usd: resp.cost_usd,
            })
            .await?;

        let today = crate::dates::today(self.offset);
        let usage = match self
            .store
            .read_usage_metrics(today, self.fallback_balance)
            .await
        {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "usage metrics unavailable for report summary");
                UsageMetrics::default()
            }
        };
        let summary = chat_summary(&resp.text, &usage);
        let delivered = self
            .notifier
            .notify(&Notice::Report(ReportNotice {
                title: format!("Daily Insight {}", material.date),
                summary: summary.clone(),
                web_url: self.web_url.clone(),
            }))
            .await;

        info!(
            output_id = %stored.id,
            stories = material.top_stories.len(),
            cost_usd = resp.cost_usd,
            delivered,
            "daily report generated"
        );
        Ok(DailyReport {
            output_id: stored.id,
            markdown: resp.text,
            chat_summary: summary,
            cost_usd: resp.cost_usd,
            stories: material.top_stories.len(),
            delivered,
        })
    }
}
