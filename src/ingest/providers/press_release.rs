// src/ingest/providers/press_release.rs
//! Press-release search pages: one search per configured query.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use serde_json::Map;

use crate::config::SourcesConfig;
use crate::ingest::json_str;
use crate::ingest::types::{FetchedItem, Fetcher};
use crate::model::SourceType;

#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub url: String,
    pub title: String,
    pub company: String,
    pub published_at: String,
}

pub struct PressReleaseFetcher {
    client: reqwest::Client,
    base: String,
    queries: Vec<String>,
    limit: usize,
    full_body: bool,
    delay: Duration,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("bad selector {css}: {e:?}"))
}

/// Parse a search result page. Relative links are resolved against `base`.
pub fn parse_listing(html: &str, base: &Url, limit: usize) -> Result<Vec<Listing>> {
    let doc = Html::parse_document(html);
    let item_sel = selector(".list-article li")?;
    let link_sel = selector("a")?;
    let h3_sel = selector("h3")?;
    let name_sel = selector(".name")?;
    let time_sel = selector("time")?;

    let mut out = Vec::new();
    for li in doc.select(&item_sel).take(limit) {
        let Some(link) = li.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let title = link
            .select(&h3_sel)
            .next()
            .map(|h| h.text().collect::<String>())
            .unwrap_or_default()
            .trim()
            .to_string();
        if title.is_empty() {
            continue;
        }
        let Ok(url) = base.join(href) else {
            continue;
        };
        out.push(Listing {
            url: url.to_string(),
            title,
            company: li
                .select(&name_sel)
                .next()
                .map(|n| n.text().collect::<String>().trim().to_string())
                .unwrap_or_default(),
            published_at: li
                .select(&time_sel)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .unwrap_or_default()
                .to_string(),
        });
    }
    Ok(out)
}

/// Body text of one article page.
pub fn parse_article_body(html: &str) -> Result<String> {
    let doc = Html::parse_document(html);
    let sel = selector(".content-body")?;
    Ok(doc
        .select(&sel)
        .next()
        .map(|b| crate::extract::collapse_whitespace(&b.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default())
}

impl PressReleaseFetcher {
    pub fn new(client: reqwest::Client, sources: &SourcesConfig, delay: Duration) -> Self {
        Self {
            client,
            base: sources.press_release_base().to_string(),
            queries: sources.press_release_queries.clone(),
            limit: sources.press_release_limit,
            full_body: sources.press_release_full_body,
            delay,
        }
    }

    fn search_url(&self, query: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base).context("press release base url")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("base url cannot take a path"))?
            .pop_if_empty()
            .extend(["main", "html", "searchrlp", "company_id", query]);
        Ok(url)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        self.client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?
            .text()
            .await
            .context("press release .text()")
    }

    async fn search(&self, query: &str) -> Result<Vec<Listing>> {
        let url = self.search_url(query)?;
        let html = self.get_text(url.as_str()).await?;
        parse_listing(&html, &url, self.limit)
    }
}

#[async_trait]
impl Fetcher for PressReleaseFetcher {
    async fn fetch(&self) -> Result<Vec<FetchedItem>> {
        let mut out = Vec::new();
        for query in &self.queries {
            let listings = match self.search(query).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = ?e, %query, "press release search failed");
                    continue;
                }
            };
            tracing::info!(%query, count = listings.len(), "press releases listed");
            for l in listings {
                let body = if self.full_body {
                    tokio::time::sleep(self.delay).await;
                    match self.get_text(&l.url).await.and_then(|h| parse_article_body(&h)) {
                        Ok(b) => b,
                        Err(e) => {
                            tracing::warn!(error = ?e, url = %l.url, "article body fetch failed");
                            String::new()
                        }
                    }
                } else {
                    String::new()
                };
                let mut metadata = Map::new();
                metadata.insert("title".into(), json_str(l.title.clone()));
                metadata.insert("company".into(), json_str(l.company));
                metadata.insert("published_at".into(), json_str(l.published_at));
                metadata.insert("query".into(), json_str(query.clone()));
                out.push(FetchedItem {
                    url: l.url,
                    title: l.title,
                    body,
                    metadata,
                });
            }
        }
        Ok(out)
    }

    fn source_type(&self) -> SourceType {
        SourceType::PressRelease
    }

    fn name(&self) -> &str {
        "press_release"
    }
}
