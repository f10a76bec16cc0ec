// src/dedup.rs
//! URL and content-hash uniqueness checks in front of the store.

use std::collections::HashSet;

use crate::error::StoreError;
use crate::model::{NewRawContent, SourceType};
use crate::store::{ContentStore, InsertOutcome};

/// SHA-256 of the exact content bytes, lowercase hex (64 chars).
pub fn fingerprint(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Per-run counters for one fetch stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DedupCounts {
    pub fetched: usize,
    pub saved: usize,
    pub skipped: usize,
    pub duplicate: usize,
}

/// What happened to one submitted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Saved,
    /// URL was already known before the store was asked.
    Skipped,
    /// The store refused it (hash or URL collision).
    Duplicate,
}

/// Seen-URL set loaded once per run, plus the store's own hash check.
pub struct Deduplicator {
    seen_urls: HashSet<String>,
    counts: DedupCounts,
}

impl Deduplicator {
    pub fn new(seen_urls: HashSet<String>) -> Self {
        Self {
            seen_urls,
            counts: DedupCounts::default(),
        }
    }

    /// Load every URL the store already holds (optionally one source type).
    pub async fn preload(
        store: &dyn ContentStore,
        source_type: Option<SourceType>,
    ) -> Result<Self, StoreError> {
        let urls = store.list_existing_urls(source_type).await?;
        tracing::debug!(count = urls.len(), "preloaded existing urls");
        Ok(Self::new(urls))
    }

    pub fn is_new_url(&self, url: &str) -> bool {
        !self.seen_urls.contains(url)
    }

    /// The store owns the hash index; this only asks it.
    pub async fn is_new_content(
        &self,
        store: &dyn ContentStore,
        hash: &str,
    ) -> Result<bool, StoreError> {
        Ok(!store.has_content_hash(hash).await?)
    }

    pub fn record(&mut self, url: &str) {
        self.seen_urls.insert(url.to_string());
    }

    pub fn counts(&self) -> DedupCounts {
        self.counts
    }

    /// Fingerprint, check, insert and count one fetched item.
    pub async fn admit(
        &mut self,
        store: &dyn ContentStore,
        source_type: SourceType,
        url: String,
        content: String,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Admission, StoreError> {
        self.counts.fetched += 1;
        if !self.is_new_url(&url) {
            self.counts.skipped += 1;
            return Ok(Admission::Skipped);
        }
        let content_hash = fingerprint(&content);
        let outcome = store
            .insert_raw(NewRawContent {
                source_type,
                url: url.clone(),
                content,
                content_hash,
                metadata,
            })
            .await?;
        match outcome {
            InsertOutcome::Inserted(_) => {
                self.record(&url);
                self.counts.saved += 1;
                Ok(Admission::Saved)
            }
            InsertOutcome::Duplicate => {
                self.counts.duplicate += 1;
                Ok(Admission::Duplicate)
            }
        }
    }
}
