//! Content store: raw fetches, extracts, analysis outputs and counters.
//!
//! The trait is the seam the pipeline talks to; [`MemoryStore`] is the bundled
//! backend (in-process tables with an optional JSON snapshot on disk).

pub mod memory;
pub mod usage;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::lazy::Memo;
use crate::model::{
    AnalysisOutput, AnalysisRole, CreditBalanceSnapshot, CreditProvider, ExtractedText,
    NewAnalysisOutput, NewExtract, NewRawContent, RawContent, SourceType, TrendCounter,
    TrendSource, UsageCounter, UsageMetrics,
};

pub use memory::MemoryStore;

/// Result of inserting raw content. A duplicate is a soft outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(RawContent),
    Duplicate,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

pub type SharedStore = Arc<dyn ContentStore>;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert raw content; an existing content hash or URL yields `Duplicate`.
    async fn insert_raw(&self, item: NewRawContent) -> Result<InsertOutcome, StoreError>;

    async fn has_content_hash(&self, hash: &str) -> Result<bool, StoreError>;

    async fn get_raw(&self, id: Uuid) -> Result<Option<RawContent>, StoreError>;

    async fn list_existing_urls(
        &self,
        source_type: Option<SourceType>,
    ) -> Result<HashSet<String>, StoreError>;

    /// Raw rows with no extract yet, newest first.
    async fn list_unprocessed_raw(&self, limit: usize) -> Result<Vec<RawContent>, StoreError>;

    async fn insert_extract(&self, item: NewExtract) -> Result<ExtractedText, StoreError>;

    async fn get_extract(&self, id: Uuid) -> Result<Option<ExtractedText>, StoreError>;

    /// Extracts with no `classify` output yet, newest first.
    async fn list_unanalyzed_extracts(
        &self,
        limit: usize,
    ) -> Result<Vec<ExtractedText>, StoreError>;

    /// Persist an output and add it to today's usage counter for its model.
    async fn insert_output(&self, item: NewAnalysisOutput) -> Result<AnalysisOutput, StoreError>;

    /// Newest first.
    async fn list_outputs_by_role(
        &self,
        role: AnalysisRole,
        limit: usize,
    ) -> Result<Vec<AnalysisOutput>, StoreError>;

    /// Outputs created at or after `since`, newest first.
    async fn list_recent_outputs(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<AnalysisOutput>, StoreError>;

    /// Add `delta` to the counter for the key, creating it at `delta`.
    async fn upsert_trend_counter(
        &self,
        date: NaiveDate,
        keyword: &str,
        source: TrendSource,
        delta: i64,
    ) -> Result<TrendCounter, StoreError>;

    async fn list_trend_counters(&self, since: NaiveDate)
        -> Result<Vec<TrendCounter>, StoreError>;

    async fn list_usage_since(&self, since: NaiveDate) -> Result<Vec<UsageCounter>, StoreError>;

    async fn insert_credit_balance(
        &self,
        provider: CreditProvider,
        balance_usd: f64,
    ) -> Result<CreditBalanceSnapshot, StoreError>;

    async fn latest_credit_balance(
        &self,
        provider: CreditProvider,
    ) -> Result<Option<CreditBalanceSnapshot>, StoreError>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Cost dashboard figures for `today` (a date in the reporting timezone).
    async fn read_usage_metrics(
        &self,
        today: NaiveDate,
        fallback_balance: f64,
    ) -> Result<UsageMetrics, StoreError> {
        let month_start = crate::dates::month_start(today);
        let week_start = today - chrono::Duration::days(7);
        let since = month_start.min(week_start);
        let rows = self.list_usage_since(since).await?;
        let balance = self
            .latest_credit_balance(CreditProvider::Anthropic)
            .await?
            .map(|s| s.balance_usd);
        Ok(usage::compute_usage_metrics(
            &rows,
            today,
            balance,
            fallback_balance,
        ))
    }
}

static SHARED_STORE: Memo<SharedStore> = Memo::new();

/// Process-wide store handle, built on first call and reused afterwards.
///
/// With a `snapshot` path (`STORE_SNAPSHOT_PATH` via [`PipelineConfig`]) the
/// store is backed by that JSON file; otherwise it lives in memory only.
///
/// [`PipelineConfig`]: crate::config::PipelineConfig
pub fn shared_store(
    snapshot: Option<&Path>,
    offset: chrono::FixedOffset,
) -> Result<SharedStore, StoreError> {
    SHARED_STORE.get_or_try_init(|| {
        let store = match snapshot {
            Some(path) => {
                tracing::info!(path = %path.display(), "opening snapshot-backed content store");
                MemoryStore::open(path, offset)?
            }
            None => {
                tracing::info!("opening in-memory content store");
                MemoryStore::new(offset)
            }
        };
        Ok(Arc::new(store) as SharedStore)
    })
}

/// Drop the memoized handle (tests).
pub fn reset_shared_store() {
    SHARED_STORE.reset();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::offset_hours;
    use serde_json::Map;

    #[tokio::test]
    async fn shared_store_writes_to_the_given_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        reset_shared_store();

        let store = shared_store(Some(&path), offset_hours(9)).unwrap();
        let again = shared_store(None, offset_hours(9)).unwrap();
        assert!(Arc::ptr_eq(&store, &again));

        store
            .insert_raw(NewRawContent {
                source_type: SourceType::Media,
                url: "https://a".into(),
                content: "x".into(),
                content_hash: crate::dedup::fingerprint("x"),
                metadata: Map::new(),
            })
            .await
            .unwrap();
        assert!(path.exists());
        reset_shared_store();
    }
}
