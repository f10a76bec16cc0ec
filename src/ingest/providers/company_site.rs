// src/ingest/providers/company_site.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Map;

use crate::config::CompanyConfig;
use crate::extract::extract_with_rules;
use crate::ingest::json_str;
use crate::ingest::types::{FetchedItem, Fetcher};
use crate::model::SourceType;

pub const PAGE_MAX_CHARS: usize = 10_000;

pub struct CompanySiteFetcher {
    client: reqwest::Client,
    companies: Vec<CompanyConfig>,
    delay: Duration,
}

impl CompanySiteFetcher {
    pub fn new(client: reqwest::Client, companies: Vec<CompanyConfig>, delay: Duration) -> Self {
        Self {
            client,
            companies,
            delay,
        }
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
            .context("company page .text()")
    }
}

/// `(title, text)`; title from `<title>`, else the first `<h1>`.
pub fn parse_page(html: &str) -> (String, String) {
    let doc = Html::parse_document(html);
    let pick = |css: &str| {
        Selector::parse(css).ok().and_then(|s| {
            doc.select(&s)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
        })
    };
    let title = pick("title").or_else(|| pick("h1")).unwrap_or_default();
    let text: String = extract_with_rules(html)
        .text
        .chars()
        .take(PAGE_MAX_CHARS)
        .collect();
    (title, text)
}

#[async_trait]
impl Fetcher for CompanySiteFetcher {
    async fn fetch(&self) -> Result<Vec<FetchedItem>> {
        let mut out = Vec::new();
        for company in &self.companies {
            let mut pages = 0usize;
            for (i, url) in company.page_urls().into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(self.delay).await;
                }
                let html = match self.get_text(&url).await {
                    Ok(h) => h,
                    Err(e) => {
                        tracing::warn!(error = ?e, company = %company.name, %url, "company page failed");
                        continue;
                    }
                };
                let (title, text) = parse_page(&html);
                if text.is_empty() {
                    continue;
                }
                let mut metadata = Map::new();
                metadata.insert("title".into(), json_str(title.clone()));
                metadata.insert("company".into(), json_str(company.name.clone()));
                out.push(FetchedItem {
                    url,
                    title,
                    body: text,
                    metadata,
                });
                pages += 1;
            }
            tracing::info!(company = %company.name, count = pages, "company pages fetched");
        }
        Ok(out)
    }

    fn source_type(&self) -> SourceType {
        SourceType::CompanySite
    }

    fn name(&self) -> &str {
        "company_site"
    }
}
