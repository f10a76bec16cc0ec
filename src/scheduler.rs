// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pipeline::Pipeline;

#[derive(Clone, Copy, Debug)]
pub struct DailySchedulerCfg {
    pub interval: Duration,
    /// Run once immediately instead of waiting a full interval.
    pub run_on_start: bool,
}

/// Spawn the in-process daily trigger. The next tick is awaited only after the
/// previous run returned; HTTP triggers queue behind it on the pipeline's run
/// lock.
pub fn spawn_daily_scheduler(pipeline: Arc<Pipeline>, cfg: DailySchedulerCfg) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !cfg.run_on_start {
            ticker.tick().await;
        }
        loop {
            ticker.tick().await;
            counter!("scheduler_runs_total").increment(1);
            match pipeline.run_daily().await {
                Ok(run) => tracing::info!(
                    target: "scheduler",
                    saved = run.fetch.saved,
                    analyzed = run.analyze.analyzed,
                    "scheduled daily run ok"
                ),
                Err(e) => tracing::error!(target: "scheduler", error = %e, "scheduled daily run failed"),
            }
        }
    })
}
