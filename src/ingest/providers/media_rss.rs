// src/ingest/providers/media_rss.rs
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Map;

use super::rss::{self, Item};
use crate::config::sources::FeedConfig;
use crate::ingest::types::{FetchedItem, Fetcher};
use crate::ingest::{json_str, normalize_text};
use crate::model::SourceType;

const SUMMARY_MAX_CHARS: usize = 5_000;

pub struct MediaRssFetcher {
    client: reqwest::Client,
    feeds: Vec<FeedConfig>,
}

impl MediaRssFetcher {
    pub fn new(client: reqwest::Client, feeds: Vec<FeedConfig>) -> Self {
        Self { client, feeds }
    }
}

/// Items lacking a link or title are dropped.
pub fn to_items(feed: &FeedConfig, items: Vec<Item>) -> Vec<FetchedItem> {
    items
        .into_iter()
        .filter_map(|it| {
            let url = it.link.as_deref()?.trim().to_string();
            let title = normalize_text(it.title.as_deref()?, 500);
            if url.is_empty() || title.is_empty() {
                return None;
            }
            let mut metadata = Map::new();
            metadata.insert("title".into(), json_str(title.clone()));
            metadata.insert("source".into(), json_str(feed.name.clone()));
            if let Some(p) = it.published_at() {
                metadata.insert("published_at".into(), json_str(p));
            }
            Some(FetchedItem {
                url,
                title,
                body: normalize_text(
                    it.description.as_deref().unwrap_or_default(),
                    SUMMARY_MAX_CHARS,
                ),
                metadata,
            })
        })
        .collect()
}

#[async_trait]
impl Fetcher for MediaRssFetcher {
    async fn fetch(&self) -> Result<Vec<FetchedItem>> {
        let mut out = Vec::new();
        for feed in &self.feeds {
            match rss::fetch_items(&self.client, &feed.url).await {
                Ok(items) => {
                    let v = to_items(feed, items);
                    tracing::info!(feed = %feed.name, count = v.len(), "media feed fetched");
                    out.extend(v);
                }
                Err(e) => tracing::warn!(error = ?e, feed = %feed.url, "media feed failed"),
            }
        }
        Ok(out)
    }

    fn source_type(&self) -> SourceType {
        SourceType::Media
    }

    fn name(&self) -> &str {
        "media_rss"
    }
}
