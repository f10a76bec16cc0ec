//! Insight pipeline service. Boots the Axum HTTP server with every stage
//! trigger, the Prometheus exporter and (optionally) the in-process daily
//! scheduler.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;

use insight_pipeline::metrics::Metrics;
use insight_pipeline::scheduler::{spawn_daily_scheduler, DailySchedulerCfg};
use insight_pipeline::{create_router, init_tracing, AppState, Pipeline};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let pipeline = Arc::new(Pipeline::from_env().context("building pipeline")?);

    if let Some(interval) = pipeline.config().daily_interval {
        tracing::info!(interval_secs = interval.as_secs(), "in-process daily scheduler enabled");
        spawn_daily_scheduler(
            pipeline.clone(),
            DailySchedulerCfg {
                interval,
                run_on_start: false,
            },
        );
    }

    let mut router = create_router(AppState::new(pipeline));
    match Metrics::init() {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = %e, "prometheus exporter disabled"),
    }

    Ok(router.into())
}
