// src/ingest/providers/rss.rs
//! Minimal RSS 2.0 reader shared by the media and social fetchers.

use anyhow::{Context, Result};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{OffsetDateTime, UtcOffset};

use crate::ingest::scrub_html_entities_for_xml;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    pub title: Option<String>,
    pub link: Option<String>,
    #[serde(rename = "pubDate")]
    pub pub_date: Option<String>,
    pub description: Option<String>,
}

impl Item {
    /// RFC 3339 publish time, or the raw string when it is not RFC 2822.
    pub fn published_at(&self) -> Option<String> {
        let raw = self.pub_date.as_deref()?.trim();
        Some(
            OffsetDateTime::parse(raw, &Rfc2822)
                .ok()
                .and_then(|dt| dt.to_offset(UtcOffset::UTC).format(&Rfc3339).ok())
                .unwrap_or_else(|| raw.to_string()),
        )
    }
}

pub fn parse_items(xml: &str) -> Result<Vec<Item>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;
    histogram!("fetch_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(rss.channel.item)
}

pub async fn fetch_items(client: &reqwest::Client, url: &str) -> Result<Vec<Item>> {
    let body = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url}"))?
        .text()
        .await
        .context("rss .text()")?;
    parse_items(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_items_and_dates() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>x</title>
            <item><title>A&nbsp;house</title><link>https://e.com/a</link>
            <pubDate>Tue, 06 May 2025 09:00:00 +0900</pubDate>
            <description><![CDATA[<p>Body</p>]]></description></item>
            <item><title>B</title></item>
            </channel></rss>"#;
        let items = parse_items(xml).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("A house"));
        assert_eq!(
            items[0].published_at().as_deref(),
            Some("2025-05-06T00:00:00Z")
        );
        assert!(items[1].link.is_none());
    }

    #[test]
    fn empty_channel_is_ok() {
        let xml = r#"<rss><channel><title>x</title></channel></rss>"#;
        assert!(parse_items(xml).unwrap().is_empty());
    }
}
