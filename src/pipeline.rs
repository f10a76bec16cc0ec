// src/pipeline.rs
//! Stage orchestration: Fetch -> Extract -> Analyze -> Report.
//!
//! Every stage is callable on its own. A stage that fails sends an error notice
//! (stage name, message, counts so far) and the error is returned to the caller.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use metrics::{counter, gauge};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::analyze::{AnalyzeReport, Analyzer};
use crate::config::{self, LlmConfig, PipelineConfig};
use crate::dedup::DedupCounts;
use crate::error::{PipelineError, StoreError};
use crate::extract::Extractor;
use crate::ingest::{self, types::Fetcher};
use crate::llm::LlmGateways;
use crate::model::{ExtractorKind, NewExtract, EXTRACTOR_VERSION};
use crate::notify::{Notice, NotifierMux};
use crate::report::{DailyReport, Reporter};
use crate::store::{self, SharedStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    pub considered: usize,
    pub extracted: usize,
    pub llm: usize,
    pub rule: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyRunReport {
    pub fetch: DedupCounts,
    pub extract: ExtractReport,
    pub analyze: AnalyzeReport,
    pub report: Option<DailyReport>,
}

/// How the analyze stage should bound its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzeMode {
    Single { limit: usize },
    Batched { batch_size: usize, max_batches: usize },
}

pub struct Pipeline {
    store: SharedStore,
    gateways: LlmGateways,
    extractor: Extractor,
    analyzer: Analyzer,
    reporter: Reporter,
    fetchers: Vec<Arc<dyn Fetcher>>,
    notifier: NotifierMux,
    config: PipelineConfig,
    /// Held for the whole of every `run_*` call, so two triggers never read
    /// the same unprocessed set.
    run_lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        store: SharedStore,
        gateways: LlmGateways,
        fetchers: Vec<Arc<dyn Fetcher>>,
        notifier: NotifierMux,
        config: PipelineConfig,
    ) -> Self {
        let offset = config.offset();
        let extractor = Extractor::new(Some(gateways.extraction.clone()));
        let analyzer = Analyzer::new(store.clone(), gateways.analysis.clone(), offset);
        let reporter = Reporter::new(
            store.clone(),
            gateways.analysis.clone(),
            notifier.clone(),
            offset,
        )
        .fallback_balance(config.fallback_balance_usd)
        .web_url(config.report_web_url.clone());
        Self {
            store,
            gateways,
            extractor,
            analyzer,
            reporter,
            fetchers,
            notifier,
            config,
            run_lock: Mutex::new(()),
        }
    }

    /// Everything from the environment and `config/`: shared store, LLM
    /// gateways, fetchers and notification channels.
    pub fn from_env() -> anyhow::Result<Self> {
        let cfg = PipelineConfig::from_env();
        let store = store::shared_store(cfg.store_snapshot_path.as_deref(), cfg.offset())
            .context("opening content store")?;
        let gateways = LlmGateways::from_config(&LlmConfig::load_default());
        let sources = config::sources::load_sources_default()?;
        let companies = config::sources::load_companies_default()?;
        let fetchers = ingest::build_fetchers(&sources, &companies, cfg.fetch_delay)?;
        let notifier = NotifierMux::from_env(cfg.offset());
        Ok(Self::new(store, gateways, fetchers, notifier, cfg))
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn gateways(&self) -> &LlmGateways {
        &self.gateways
    }

    pub fn notifier(&self) -> &NotifierMux {
        &self.notifier
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn guarded<T, F>(&self, stage: &'static str, details: Value, fut: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        match fut.await {
            Ok(v) => Ok(v),
            Err(e) => {
                counter!("stage_failures_total", "stage" => stage).increment(1);
                error!(stage, error = %e, "stage failed");
                self.notifier
                    .notify(&Notice::error(stage, e.to_string(), Some(details)))
                    .await;
                Err(e)
            }
        }
    }

    async fn fetch_stage(&self) -> Result<DedupCounts, PipelineError> {
        let counts = ingest::fetch_all(&self.fetchers, self.store.as_ref()).await?;
        info!(
            fetched = counts.fetched,
            saved = counts.saved,
            skipped = counts.skipped,
            duplicate = counts.duplicate,
            "fetch stage done"
        );
        Ok(counts)
    }

    async fn extract_stage(&self, limit: usize) -> Result<ExtractReport, PipelineError> {
        let pending = self.store.list_unprocessed_raw(limit).await?;
        let mut report = ExtractReport {
            considered: pending.len(),
            ..Default::default()
        };
        for raw in pending {
            let out = self
                .extractor
                .extract(&raw.content, raw.source_type.prefers_llm_extraction())
                .await;
            let kind = out.extractor;
            let inserted = self
                .store
                .insert_extract(NewExtract {
                    raw_content_id: raw.id,
                    text: out.text,
                    tables: out.tables,
                    images: out.images,
                    extractor_used: kind,
                    extractor_version: EXTRACTOR_VERSION.to_string(),
                })
                .await;
            match inserted {
                Ok(_) => {
                    report.extracted += 1;
                    match kind {
                        ExtractorKind::Llm => report.llm += 1,
                        _ => report.rule += 1,
                    }
                }
                Err(StoreError::Validation(msg)) => {
                    warn!(raw_id = %raw.id, %msg, "extract rejected");
                    report.failed += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(?report, "extract stage done");
        Ok(report)
    }

    async fn analyze_stage(&self, mode: AnalyzeMode) -> Result<AnalyzeReport, PipelineError> {
        let report = match mode {
            AnalyzeMode::Single { limit } => self.analyzer.analyze_batch(limit).await?,
            AnalyzeMode::Batched {
                batch_size,
                max_batches,
            } => self.analyzer.analyze_batched(batch_size, max_batches).await?,
        };
        info!(
            analyzed = report.analyzed,
            failed = report.failed,
            batches = report.batches,
            "analyze stage done"
        );
        Ok(report)
    }

    /// Crawl every source and store what is new.
    pub async fn run_fetch(&self) -> Result<DedupCounts, PipelineError> {
        let _run = self.run_lock.lock().await;
        let counts = self
            .guarded("crawl", json!({}), self.fetch_stage())
            .await?;
        self.notifier
            .notify(&Notice::success(
                "crawl",
                format!("Crawl finished: {} new item(s)", counts.saved),
                vec![
                    ("fetched".into(), counts.fetched as f64),
                    ("saved".into(), counts.saved as f64),
                    ("skipped".into(), counts.skipped as f64),
                    ("duplicate".into(), counts.duplicate as f64),
                ],
            ))
            .await;
        Ok(counts)
    }

    pub async fn run_extract(&self, limit: Option<usize>) -> Result<ExtractReport, PipelineError> {
        let limit = limit.unwrap_or(self.config.extract_limit);
        let _run = self.run_lock.lock().await;
        self.guarded("extract", json!({ "limit": limit }), self.extract_stage(limit))
            .await
    }

    pub async fn run_analyze(&self, mode: AnalyzeMode) -> Result<AnalyzeReport, PipelineError> {
        let _run = self.run_lock.lock().await;
        self.guarded("analyze", json!({ "mode": format!("{mode:?}") }), self.analyze_stage(mode))
            .await
    }

    pub async fn run_report(&self) -> Result<DailyReport, PipelineError> {
        let _run = self.run_lock.lock().await;
        self.guarded("report", json!({}), self.reporter.generate())
            .await
    }

    /// The full daily sequence. Each stage finishes before the next begins.
    pub async fn run_daily(&self) -> Result<DailyRunReport, PipelineError> {
        let _run = self.run_lock.lock().await;
        let started = std::time::Instant::now();
        let mut run = DailyRunReport::default();

        run.fetch = self
            .guarded("daily:crawl", json!({}), self.fetch_stage())
            .await?;
        run.extract = self
            .guarded(
                "daily:extract",
                json!({ "fetch": run.fetch }),
                self.extract_stage(self.config.extract_limit),
            )
            .await?;
        run.analyze = self
            .guarded(
                "daily:analyze",
                json!({ "fetch": run.fetch, "extract": run.extract }),
                self.analyze_stage(AnalyzeMode::Batched {
                    batch_size: self.config.analyze_batch_size,
                    max_batches: self.config.analyze_max_batches,
                }),
            )
            .await?;
        run.report = Some(
            self.guarded(
                "daily:report",
                json!({ "fetch": run.fetch, "extract": run.extract, "analyze": run.analyze }),
                self.reporter.generate(),
            )
            .await?,
        );

        gauge!("pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        let elapsed_s = started.elapsed().as_secs_f64();
        self.notifier
            .notify(&Notice::success(
                "daily",
                "Daily pipeline completed",
                vec![
                    ("fetched".into(), run.fetch.fetched as f64),
                    ("saved".into(), run.fetch.saved as f64),
                    ("extracted".into(), run.extract.extracted as f64),
                    ("analyzed".into(), run.analyze.analyzed as f64),
                    ("failed".into(), run.analyze.failed as f64),
                    (
                        "report_cost_usd".into(),
                        run.report.as_ref().map(|r| r.cost_usd).unwrap_or(0.0),
                    ),
                    ("elapsed_s".into(), (elapsed_s * 10.0).round() / 10.0),
                ],
            ))
            .await;
        info!(elapsed_s, "daily run finished");
        Ok(run)
    }
}
