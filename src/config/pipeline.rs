// src/config/pipeline.rs
//! Runtime knobs read from the environment (`.env` is loaded by the binary).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;

use crate::dates;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub extract_limit: usize,
    pub analyze_limit: usize,
    pub analyze_batch_size: usize,
    pub analyze_max_batches: usize,
    pub tz_offset_hours: i32,
    pub fallback_balance_usd: f64,
    pub fetch_delay: Duration,
    pub report_web_url: Option<String>,
    pub store_snapshot_path: Option<PathBuf>,
    pub daily_interval: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extract_limit: 50,
            analyze_limit: 30,
            analyze_batch_size: 10,
            analyze_max_batches: 3,
            tz_offset_hours: dates::DEFAULT_OFFSET_HOURS,
            fallback_balance_usd: 5.0,
            fetch_delay: Duration::from_millis(1000),
            report_web_url: None,
            store_snapshot_path: None,
            daily_interval: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable env value");
            None
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            extract_limit: env_parse::<usize>("EXTRACT_LIMIT")
                .filter(|n| *n > 0)
                .unwrap_or(d.extract_limit),
            analyze_limit: env_parse::<usize>("ANALYZE_LIMIT")
                .filter(|n| *n > 0)
                .unwrap_or(d.analyze_limit),
            analyze_batch_size: env_parse::<usize>("ANALYZE_BATCH_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(d.analyze_batch_size),
            analyze_max_batches: env_parse::<usize>("ANALYZE_MAX_BATCHES")
                .filter(|n| *n > 0)
                .unwrap_or(d.analyze_max_batches),
            tz_offset_hours: env_parse::<i32>("PIPELINE_TZ_OFFSET_HOURS")
                .filter(|h: &i32| (-23..=23).contains(h))
                .unwrap_or(d.tz_offset_hours),
            fallback_balance_usd: env_parse::<f64>("FALLBACK_BALANCE_USD")
                .filter(|v: &f64| v.is_finite())
                .unwrap_or(d.fallback_balance_usd),
            fetch_delay: env_parse::<u64>("FETCH_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.fetch_delay),
            report_web_url: env_string("REPORT_WEB_URL"),
            store_snapshot_path: env_string("STORE_SNAPSHOT_PATH").map(PathBuf::from),
            daily_interval: env_parse::<u64>("DAILY_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        dates::offset_hours(self.tz_offset_hours)
    }
}
