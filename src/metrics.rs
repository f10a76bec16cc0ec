use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_fetched_total", "Items returned by fetchers.");
        describe_counter!("pipeline_saved_total", "Fetched items stored as new raw content.");
        describe_counter!(
            "pipeline_skipped_total",
            "Fetched items whose URL was already known."
        );
        describe_counter!(
            "pipeline_duplicate_total",
            "Fetched items rejected by the store (hash or URL collision)."
        );
        describe_counter!("fetch_errors_total", "Fetcher runs that failed and were skipped.");
        describe_histogram!("fetch_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("pipeline_last_fetch_ts", "Unix ts of the last completed fetch stage.");
        describe_counter!("extract_processed_total", "Extractions by path actually used.");
        describe_counter!("analyze_items_total", "Per-extract analysis outcomes.");
        describe_counter!("llm_calls_total", "LLM calls by model.");
        describe_counter!("llm_tokens_in_total", "Input tokens billed or estimated.");
        describe_counter!("llm_tokens_out_total", "Output tokens billed or estimated.");
        describe_histogram!("llm_cost_usd", "Cost per LLM call in USD.");
        describe_counter!("notify_failures_total", "Notification deliveries that failed.");
        describe_counter!("stage_failures_total", "Pipeline stages that aborted.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts of the last successful daily run.");
        describe_counter!("scheduler_runs_total", "Daily runs started by the in-process scheduler.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Fails if another recorder is already set.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
