// src/analyze/mod.rs
//! Classify -> (compare) -> trend tags per extract, then one trend and one
//! strategy summary per run.
//!
//! Item failures (LLM call or insert for one extract) are logged and counted;
//! the batch keeps going. Failures in the two summaries propagate.

pub mod prompts;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, FixedOffset};
use metrics::counter;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::llm::{json, LlmGateway, LlmRequest, LlmResponse};
use crate::model::{
    AnalysisRole, Classification, ExtractedText, ExtractorKind, NewAnalysisOutput, StrategyPlan,
    StructuredOutput, TrendDigest, TrendSource, SENTINEL_EXTRACT_ID,
};
use crate::store::SharedStore;

/// Keyword counters older than this are not shown to the trend prompt.
const TREND_LOOKBACK_DAYS: i64 = 7;
const TREND_COUNTERS_IN_PROMPT: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyzeReport {
    /// Extracts picked up this run.
    pub considered: usize,
    /// Extracts with a persisted classify output (quarantined ones included).
    pub analyzed: usize,
    pub failed: usize,
    pub quarantined: usize,
    pub compared: usize,
    pub compare_failed: usize,
    pub tags_recorded: usize,
    pub batches: usize,
    pub trend_output_id: Option<Uuid>,
    pub strategy_output_id: Option<Uuid>,
}

pub struct Analyzer {
    store: SharedStore,
    gateway: Arc<LlmGateway>,
    offset: FixedOffset,
}

fn outcome(label: &'static str) {
    counter!("analyze_items_total", "outcome" => label).increment(1);
}

fn output_from(
    extract_id: Uuid,
    role: AnalysisRole,
    resp: &LlmResponse,
    markdown: Option<String>,
    structured: Option<StructuredOutput>,
) -> NewAnalysisOutput {
    NewAnalysisOutput {
        extracted_text_id: extract_id,
        role,
        model_name: resp.model.clone(),
        output_markdown: markdown,
        output_structured: structured,
        tokens_in: resp.tokens_in,
        tokens_out: resp.tokens_out,
        cost_usd: resp.cost_usd,
    }
}

impl Analyzer {
    pub fn new(store: SharedStore, gateway: Arc<LlmGateway>, offset: FixedOffset) -> Self {
        Self {
            store,
            gateway,
            offset,
        }
    }

    fn request(&self, prompt: String) -> LlmRequest {
        LlmRequest::new(prompt).system(prompts::SYSTEM)
    }

    /// One bounded batch: the newest `limit` unanalyzed extracts, then summaries.
    pub async fn analyze_batch(&self, limit: usize) -> Result<AnalyzeReport, PipelineError> {
        let batch = self.store.list_unanalyzed_extracts(limit).await?;
        let mut report = AnalyzeReport {
            batches: usize::from(!batch.is_empty()),
            ..Default::default()
        };
        let classified = self.classify_items(&batch, &mut report).await;
        let anchor = batch.first().map(|e| e.id);
        self.summarize(&classified, anchor, &mut report).await?;
        Ok(report)
    }

    /// Repeated batches of `batch_size` until nothing is left or `max_batches`
    /// is hit, then one pair of summaries over everything classified.
    /// Extracts attempted earlier in the same run are not retried.
    pub async fn analyze_batched(
        &self,
        batch_size: usize,
        max_batches: usize,
    ) -> Result<AnalyzeReport, PipelineError> {
        let batch_size = batch_size.max(1);
        let mut report = AnalyzeReport::default();
        let mut attempted: HashSet<Uuid> = HashSet::new();
        let mut classified = Vec::new();
        let mut anchor = None;

        for round in 0..max_batches {
            let candidates = self
                .store
                .list_unanalyzed_extracts(batch_size + attempted.len())
                .await?;
            let batch: Vec<ExtractedText> = candidates
                .into_iter()
                .filter(|e| !attempted.contains(&e.id))
                .take(batch_size)
                .collect();
            if batch.is_empty() {
                break;
            }
            info!(round, size = batch.len(), "analyze batch");
            report.batches += 1;
            anchor = anchor.or_else(|| batch.first().map(|e| e.id));
            attempted.extend(batch.iter().map(|e| e.id));
            classified.extend(self.classify_items(&batch, &mut report).await);
        }

        self.summarize(&classified, anchor, &mut report).await?;
        Ok(report)
    }

    /// Classify each extract in order. Returns the classifications that parsed.
    pub async fn classify_items(
        &self,
        batch: &[ExtractedText],
        report: &mut AnalyzeReport,
    ) -> Vec<Classification> {
        let mut out = Vec::new();
        for ex in batch {
            report.considered += 1;
            match self.analyze_one(ex, report).await {
                Ok(Some(c)) => {
                    report.analyzed += 1;
                    outcome("analyzed");
                    out.push(c);
                }
                Ok(None) => {
                    report.analyzed += 1;
                    report.quarantined += 1;
                    outcome("quarantined");
                }
                Err(e) => {
                    report.failed += 1;
                    outcome("failed");
                    warn!(extract_id = %ex.id, error = %e, "classify failed, skipping item");
                }
            }
        }
        out
    }

    /// `Ok(None)` means the classification was stored quarantined.
    async fn analyze_one(
        &self,
        ex: &ExtractedText,
        report: &mut AnalyzeReport,
    ) -> Result<Option<Classification>, PipelineError> {
        let resp = self
            .gateway
            .invoke(self.request(prompts::classify(&ex.text)))
            .await?;

        let parsed = json::parse_embedded::<Classification>(&resp.text);
        let classification = match parsed {
            Ok(c) => {
                self.store
                    .insert_output(output_from(
                        ex.id,
                        AnalysisRole::Classify,
                        &resp,
                        None,
                        Some(StructuredOutput::Classification(c.clone())),
                    ))
                    .await?;
                c
            }
            Err(reason) => {
                warn!(extract_id = %ex.id, %reason, "classification quarantined");
                self.store
                    .insert_output(output_from(
                        ex.id,
                        AnalysisRole::Classify,
                        &resp,
                        Some(resp.text.clone()),
                        None,
                    ))
                    .await?;
                return Ok(None);
            }
        };

        if classification.content_type.warrants_comparison() {
            match self.compare(ex, &classification).await {
                Ok(()) => report.compared += 1,
                Err(e) => {
                    report.compare_failed += 1;
                    warn!(extract_id = %ex.id, error = %e, "compare failed");
                }
            }
        }

        report.tags_recorded += self.record_tags(ex, &classification).await;
        Ok(Some(classification))
    }

    async fn compare(
        &self,
        ex: &ExtractedText,
        classification: &Classification,
    ) -> Result<(), PipelineError> {
        let c_json = serde_json::to_string(classification)
            .map_err(|e| PipelineError::stage("analyze", e))?;
        let resp = self
            .gateway
            .invoke(self.request(prompts::compare(&c_json, &ex.text)))
            .await?;
        self.store
            .insert_output(output_from(
                ex.id,
                AnalysisRole::Compare,
                &resp,
                Some(resp.text.clone()),
                None,
            ))
            .await?;
        Ok(())
    }

    async fn trend_source_for(&self, ex: &ExtractedText) -> TrendSource {
        match self.store.get_raw(ex.raw_content_id).await {
            Ok(Some(raw)) => raw.source_type.trend_source(),
            _ => match ex.extractor_used {
                ExtractorKind::Llm => TrendSource::Sns,
                _ => TrendSource::Media,
            },
        }
    }

    /// +1 per distinct tag on today's counter. Returns how many were written.
    async fn record_tags(&self, ex: &ExtractedText, c: &Classification) -> usize {
        let today = crate::dates::today(self.offset);
        let source = self.trend_source_for(ex).await;
        let mut seen = HashSet::new();
        let mut written = 0;
        for tag in &c.topic_tags {
            let tag = tag.trim();
            if tag.is_empty() || !seen.insert(tag.to_string()) {
                continue;
            }
            match self.store.upsert_trend_counter(today, tag, source, 1).await {
                Ok(_) => written += 1,
                Err(e) => warn!(extract_id = %ex.id, error = %e, "trend counter upsert failed"),
            }
        }
        written
    }

    /// Trend then strategy, each persisted against `anchor` (or the sentinel).
    pub async fn summarize(
        &self,
        classified: &[Classification],
        anchor: Option<Uuid>,
        report: &mut AnalyzeReport,
    ) -> Result<(), PipelineError> {
        let anchor = anchor.unwrap_or(SENTINEL_EXTRACT_ID);
        let today = crate::dates::today(self.offset);
        let mut counters = self
            .store
            .list_trend_counters(today - Duration::days(TREND_LOOKBACK_DAYS))
            .await?;
        counters.truncate(TREND_COUNTERS_IN_PROMPT);

        let classifications_json = serde_json::to_string(classified)
            .map_err(|e| PipelineError::stage("analyze", e))?;
        let counters_json =
            serde_json::to_string(&counters).map_err(|e| PipelineError::stage("analyze", e))?;

        let resp = self
            .gateway
            .invoke(self.request(prompts::trend(&classifications_json, &counters_json)))
            .await?;
        let (trend_md, trend_structured, trend_json) =
            match json::parse_embedded::<TrendDigest>(&resp.text) {
                Ok(d) => {
                    let j = serde_json::to_string(&d)
                        .map_err(|e| PipelineError::stage("analyze", e))?;
                    (d.summary.clone(), Some(StructuredOutput::Trend(d)), j)
                }
                Err(reason) => {
                    warn!(%reason, "trend summary quarantined");
                    (Some(resp.text.clone()), None, resp.text.clone())
                }
            };
        let trend = self
            .store
            .insert_output(output_from(
                anchor,
                AnalysisRole::Trend,
                &resp,
                trend_md,
                trend_structured,
            ))
            .await?;
        report.trend_output_id = Some(trend.id);

        let resp = self
            .gateway
            .invoke(self.request(prompts::strategy(&trend_json, &classifications_json)))
            .await?;
        let (strategy_md, strategy_structured) =
            match json::parse_embedded::<StrategyPlan>(&resp.text) {
                Ok(p) => (None, Some(StructuredOutput::Strategy(p))),
                Err(reason) => {
                    warn!(%reason, "strategy summary quarantined");
                    (Some(resp.text.clone()), None)
                }
            };
        let strategy = self
            .store
            .insert_output(output_from(
                anchor,
                AnalysisRole::Strategy,
                &resp,
                strategy_md,
                strategy_structured,
            ))
            .await?;
        report.strategy_output_id = Some(strategy.id);

        info!(
            classified = classified.len(),
            trend_id = %trend.id,
            strategy_id = %strategy.id,
            "analysis summaries stored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::offset_hours;
    use crate::llm::{Completion, MockProvider, PriceTable};
    use crate::model::NewExtract;
    use crate::store::{ContentStore, MemoryStore};

    async fn seed(store: &MemoryStore, texts: &[&str]) {
        for t in texts {
            store
                .insert_extract(NewExtract {
                    raw_content_id: Uuid::new_v4(),
                    text: t.to_string(),
                    tables: vec![],
                    images: vec![],
                    extractor_used: ExtractorKind::Rule,
                    extractor_version: "v1".into(),
                })
                .await
                .unwrap();
        }
    }

    fn analyzer(store: Arc<MemoryStore>, provider: MockProvider) -> Analyzer {
        let gw = LlmGateway::with_provider(Arc::new(provider), "m", PriceTable::default());
        Analyzer::new(store, Arc::new(gw), offset_hours(9))
    }

    #[tokio::test]
    async fn unparsable_classification_is_quarantined_not_dropped() {
        let store = Arc::new(MemoryStore::new(offset_hours(9)));
        seed(&store, &["a"]).await;
        let a = analyzer(
            store.clone(),
            MockProvider::scripted(|call| {
                if call.prompt.starts_with("TASK: classify") {
                    Ok(Completion::text("I cannot classify this."))
                } else {
                    Ok(Completion::text("{}"))
                }
            }),
        );
        let r = a.analyze_batch(10).await.unwrap();
        assert_eq!((r.analyzed, r.quarantined, r.compared), (1, 1, 0));
        assert!(store.list_unanalyzed_extracts(10).await.unwrap().is_empty());
        let out = store
            .list_outputs_by_role(AnalysisRole::Classify, 10)
            .await
            .unwrap();
        assert!(out[0].output_structured.is_none());
        assert_eq!(
            out[0].output_markdown.as_deref(),
            Some("I cannot classify this.")
        );
    }

    #[tokio::test]
    async fn empty_batch_still_stores_summaries_on_sentinel() {
        let store = Arc::new(MemoryStore::new(offset_hours(9)));
        let a = analyzer(store.clone(), MockProvider::canned());
        let r = a.analyze_batch(10).await.unwrap();
        assert_eq!(r.considered, 0);
        let trend = store
            .list_outputs_by_role(AnalysisRole::Trend, 1)
            .await
            .unwrap();
        assert_eq!(trend[0].extracted_text_id, SENTINEL_EXTRACT_ID);
        assert!(trend[0].output_structured.is_some());
        assert_eq!(
            store
                .list_outputs_by_role(AnalysisRole::Strategy, 1)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn summary_failure_propagates() {
        let store = Arc::new(MemoryStore::new(offset_hours(9)));
        seed(&store, &["a"]).await;
        let a = analyzer(
            store.clone(),
            MockProvider::scripted(|call| {
                if call.prompt.starts_with("TASK: trend") {
                    Err(crate::error::LlmError::Upstream {
                        status: 500,
                        body: "boom".into(),
                    })
                } else {
                    Ok(Completion::text(r#"{"type":"price","topic_tags":["tax"]}"#))
                }
            }),
        );
        let err = a.analyze_batch(10).await.unwrap_err();
        assert!(matches!(err, PipelineError::Upstream { status: 500, .. }));
        // The item itself was still classified.
        assert!(store.list_unanalyzed_extracts(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batched_run_stops_at_cap() {
        let store = Arc::new(MemoryStore::new(offset_hours(9)));
        seed(&store, &["1", "2", "3", "4", "5"]).await;
        let a = analyzer(store.clone(), MockProvider::canned());
        let r = a.analyze_batched(2, 2).await.unwrap();
        assert_eq!(r.batches, 2);
        assert_eq!(r.analyzed, 4);
        assert_eq!(store.list_unanalyzed_extracts(10).await.unwrap().len(), 1);
    }
}
