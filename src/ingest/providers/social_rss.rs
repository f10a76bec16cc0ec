// src/ingest/providers/social_rss.rs
//! Social posts bridged to RSS (e.g. an Instagram-to-RSS service).

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::{Map, Value};

use super::rss::{self, Item};
use crate::ingest::types::{FetchedItem, Fetcher};
use crate::ingest::{json_str, normalize_text};
use crate::model::SourceType;

const POST_MAX_CHARS: usize = 5_000;

pub struct SocialRssFetcher {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl SocialRssFetcher {
    pub fn new(client: reqwest::Client, urls: Vec<String>) -> Self {
        Self { client, urls }
    }
}

/// `#tag` tokens without the leading `#`, in order, without repeats.
pub fn hashtags(text: &str) -> Vec<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"#([\p{L}\p{N}_]+)").unwrap());
    let mut out: Vec<String> = Vec::new();
    for cap in re.captures_iter(text) {
        let tag = cap[1].to_string();
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

pub fn to_items(items: Vec<Item>) -> Vec<FetchedItem> {
    items
        .into_iter()
        .filter_map(|it| {
            let url = it.link.as_deref()?.trim().to_string();
            let title = normalize_text(it.title.as_deref()?, 500);
            if url.is_empty() || title.is_empty() {
                return None;
            }
            let body = normalize_text(it.description.as_deref().unwrap_or_default(), POST_MAX_CHARS);
            let tags = hashtags(&body);
            let mut metadata = Map::new();
            metadata.insert("title".into(), json_str(title.clone()));
            metadata.insert("platform".into(), json_str("instagram"));
            metadata.insert(
                "hashtags".into(),
                Value::Array(tags.into_iter().map(Value::String).collect()),
            );
            if let Some(p) = it.published_at() {
                metadata.insert("published_at".into(), json_str(p));
            }
            Some(FetchedItem {
                url,
                title,
                body,
                metadata,
            })
        })
        .collect()
}

#[async_trait]
impl Fetcher for SocialRssFetcher {
    async fn fetch(&self) -> Result<Vec<FetchedItem>> {
        let mut out = Vec::new();
        for url in &self.urls {
            match rss::fetch_items(&self.client, url).await {
                Ok(items) => out.extend(to_items(items)),
                Err(e) => tracing::warn!(error = ?e, feed = %url, "social feed failed"),
            }
        }
        Ok(out)
    }

    fn source_type(&self) -> SourceType {
        SourceType::Social
    }

    fn name(&self) -> &str {
        "social_rss"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashtags_are_collected_once() {
        assert_eq!(
            hashtags("New build #注文住宅 #zeh, again #zeh#solar"),
            vec!["注文住宅".to_string(), "zeh".to_string(), "solar".to_string()]
        );
        assert!(hashtags("none here").is_empty());
    }
}
