// src/lib.rs
// Public library surface for the service binary and integration tests.

pub mod api;
pub mod config;
pub mod dates;
pub mod error;
pub mod lazy;
pub mod metrics;
pub mod model;
pub mod store;

// Fetch -> dedup -> extract -> analyze -> report
pub mod analyze;
pub mod dedup;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod report;

// Notifications & background jobs
pub mod notify;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::error::{LlmError, PipelineError, StoreError};
pub use crate::notify::{Notice, NotifierMux};
pub use crate::pipeline::{AnalyzeMode, Pipeline};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `LOG_FORMAT=json` selects JSON lines.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("insight_pipeline=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.trim().eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
