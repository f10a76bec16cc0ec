// src/ingest/types.rs
use anyhow::Result;
use serde_json::{Map, Value};

use crate::model::SourceType;

/// One collected page/article/post before deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedItem {
    pub url: String,
    pub title: String,
    pub body: String,
    pub metadata: Map<String, Value>,
}

impl FetchedItem {
    /// Stored content: press releases and media get `title\n\nbody`, other
    /// sources store the body alone.
    pub fn content_for(&self, source_type: SourceType) -> String {
        match source_type {
            SourceType::PressRelease | SourceType::Media => {
                format!("{}\n\n{}", self.title, self.body)
            }
            SourceType::CompanySite | SourceType::Social => self.body.clone(),
        }
    }
}

/// A source-specific collector. A single failing target inside `fetch` is
/// logged and skipped; an `Err` means the whole source was unusable.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self) -> Result<Vec<FetchedItem>>;
    fn source_type(&self) -> SourceType;
    fn name(&self) -> &str;
}
