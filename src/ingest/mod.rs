// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use once_cell::sync::OnceCell;
use serde_json::{Map, Value};

use crate::config::{CompanyConfig, SourcesConfig};
use crate::dedup::{DedupCounts, Deduplicator};
use crate::error::StoreError;
use crate::ingest::types::Fetcher;
use crate::store::ContentStore;

/// Decode entities, strip tags, normalize quotes and collapse whitespace.
/// Output is capped at `max_chars` characters.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    out = crate::extract::collapse_whitespace(&out);

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

/// Entities RSS feeds love and XML does not know.
pub(crate) fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

/// Shared HTTP client for scraping.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (compatible; insight-pipeline/0.1)")
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(10))
        .build()
        .context("building http client")
}

pub fn json_str(s: impl Into<String>) -> Value {
    Value::String(s.into())
}

/// The four sources in their fixed order: press releases, media feeds,
/// company sites, social feeds.
pub fn build_fetchers(
    sources: &SourcesConfig,
    companies: &[CompanyConfig],
    delay: Duration,
) -> Result<Vec<Arc<dyn Fetcher>>> {
    use providers::{
        company_site::CompanySiteFetcher, media_rss::MediaRssFetcher,
        press_release::PressReleaseFetcher, social_rss::SocialRssFetcher,
    };
    let client = http_client()?;
    Ok(vec![
        Arc::new(PressReleaseFetcher::new(client.clone(), sources, delay)),
        Arc::new(MediaRssFetcher::new(client.clone(), sources.media_rss.clone())),
        Arc::new(CompanySiteFetcher::new(client.clone(), companies.to_vec(), delay)),
        Arc::new(SocialRssFetcher::new(client, sources.social_rss.urls.clone())),
    ])
}

/// Run every fetcher in sequence and admit its items through one
/// deduplicator. A failing fetcher is logged and skipped; store errors abort.
pub async fn fetch_all(
    fetchers: &[Arc<dyn Fetcher>],
    store: &dyn ContentStore,
) -> Result<DedupCounts, StoreError> {
    crate::metrics::ensure_described();
    let mut dedup = Deduplicator::preload(store, None).await?;

    for f in fetchers {
        let items = match f.fetch().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = ?e, fetcher = f.name(), "fetcher failed, skipping");
                counter!("fetch_errors_total", "fetcher" => f.name().to_string()).increment(1);
                continue;
            }
        };
        let before = dedup.counts();
        let st = f.source_type();
        for item in items {
            let mut metadata: Map<String, Value> = item.metadata.clone();
            metadata
                .entry("title".to_string())
                .or_insert_with(|| json_str(item.title.clone()));
            let content = item.content_for(st);
            dedup
                .admit(store, st, item.url, content, metadata)
                .await?;
        }
        let after = dedup.counts();
        tracing::info!(
            fetcher = f.name(),
            fetched = after.fetched - before.fetched,
            saved = after.saved - before.saved,
            "fetcher done"
        );
    }

    let c = dedup.counts();
    counter!("pipeline_fetched_total").increment(c.fetched as u64);
    counter!("pipeline_saved_total").increment(c.saved as u64);
    counter!("pipeline_skipped_total").increment(c.skipped as u64);
    counter!("pipeline_duplicate_total").increment(c.duplicate as u64);
    gauge!("pipeline_last_fetch_ts").set(chrono::Utc::now().timestamp() as f64);
    Ok(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_decodes_and_collapses() {
        let s = "  <p>Hello,&nbsp;&nbsp; “world”</p>  ";
        assert_eq!(normalize_text(s, 1000), "Hello, \"world\"");
        assert_eq!(normalize_text("abcdef", 3), "abc");
    }

    #[test]
    fn scrub_keeps_xml_entities() {
        assert_eq!(scrub_html_entities_for_xml("a&nbsp;&amp;b"), "a &amp;b");
    }
}
