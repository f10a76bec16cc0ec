// src/config/sources.rs
//! Fetch targets: search queries, feeds and company sites.
//!
//! Both files may be TOML or JSON. A missing file is an empty configuration,
//! a malformed one is an error.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SOURCES_ENV: &str = "SOURCES_CONFIG_PATH";
const COMPANIES_ENV: &str = "COMPANIES_CONFIG_PATH";

pub const DEFAULT_PRESS_RELEASE_BASE: &str = "https://prtimes.jp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SocialFeeds {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

fn default_article_limit() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default, alias = "pr_times_queries")]
    pub press_release_queries: Vec<String>,
    #[serde(default)]
    pub press_release_base_url: Option<String>,
    /// Articles taken per query.
    #[serde(default = "default_article_limit")]
    pub press_release_limit: usize,
    /// Fetch each article page for its body text.
    #[serde(default)]
    pub press_release_full_body: bool,
    #[serde(default)]
    pub media_rss: Vec<FeedConfig>,
    #[serde(default, alias = "instagram_rss")]
    pub social_rss: SocialFeeds,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            press_release_queries: Vec::new(),
            press_release_base_url: None,
            press_release_limit: default_article_limit(),
            press_release_full_body: false,
            media_rss: Vec::new(),
            social_rss: SocialFeeds::default(),
        }
    }
}

impl SourcesConfig {
    pub fn press_release_base(&self) -> &str {
        self.press_release_base_url
            .as_deref()
            .unwrap_or(DEFAULT_PRESS_RELEASE_BASE)
    }
}

fn default_scheme() -> String {
    "https".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyConfig {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

impl CompanyConfig {
    pub fn page_urls(&self) -> Vec<String> {
        let domain = self.domain.trim().trim_end_matches('/');
        self.paths
            .iter()
            .map(|p| {
                let p = p.trim();
                if p.starts_with('/') {
                    format!("{}://{}{}", self.scheme, domain, p)
                } else {
                    format!("{}://{}/{}", self.scheme, domain, p)
                }
            })
            .collect()
    }
}

fn ext_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Env path first, then `config/<stem>.toml`, then `config/<stem>.json`.
fn resolve(env_key: &str, stem: &str) -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p.trim());
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(anyhow!("{env_key} points to non-existent path"));
    }
    for ext in ["toml", "json"] {
        let p = PathBuf::from(format!("config/{stem}.{ext}"));
        if p.exists() {
            return Ok(Some(p));
        }
    }
    Ok(None)
}

pub fn load_sources_from(path: &Path) -> Result<SourcesConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    parse_sources(&content, &ext_of(path))
}

pub fn load_sources_default() -> Result<SourcesConfig> {
    match resolve(SOURCES_ENV, "sources")? {
        Some(p) => load_sources_from(&p),
        None => Ok(SourcesConfig::default()),
    }
}

pub fn load_companies_from(path: &Path) -> Result<Vec<CompanyConfig>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading companies from {}", path.display()))?;
    parse_companies(&content, &ext_of(path))
}

pub fn load_companies_default() -> Result<Vec<CompanyConfig>> {
    match resolve(COMPANIES_ENV, "companies")? {
        Some(p) => load_companies_from(&p),
        None => Ok(Vec::new()),
    }
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<SourcesConfig> {
    let cfg: SourcesConfig = if hint_ext == "toml" {
        toml::from_str(s).context("parsing sources TOML")?
    } else {
        match serde_json::from_str(s) {
            Ok(v) => v,
            Err(json_err) => toml::from_str(s)
                .map_err(|_| anyhow!("unsupported sources format: {json_err}"))?,
        }
    };
    Ok(clean_sources(cfg))
}

fn parse_companies(s: &str, hint_ext: &str) -> Result<Vec<CompanyConfig>> {
    // TOML has no top-level arrays, so it uses [[companies]] tables.
    #[derive(Deserialize)]
    struct Wrapped {
        companies: Vec<CompanyConfig>,
    }
    let list = if hint_ext == "toml" {
        toml::from_str::<Wrapped>(s)
            .context("parsing companies TOML")?
            .companies
    } else if let Ok(v) = serde_json::from_str::<Vec<CompanyConfig>>(s) {
        v
    } else if let Ok(w) = serde_json::from_str::<Wrapped>(s) {
        w.companies
    } else {
        toml::from_str::<Wrapped>(s)
            .map_err(|_| anyhow!("unsupported companies format"))?
            .companies
    };
    Ok(list
        .into_iter()
        .filter(|c| !c.domain.trim().is_empty())
        .collect())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

fn clean_sources(mut cfg: SourcesConfig) -> SourcesConfig {
    cfg.press_release_queries = clean_list(cfg.press_release_queries);
    cfg.social_rss.urls = clean_list(cfg.social_rss.urls);
    cfg.media_rss.retain(|f| !f.url.trim().is_empty());
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_json_keys_are_accepted() {
        let json = r#"{
            "pr_times_queries": [" 住宅 ", "", "住宅"],
            "media_rss": [{"name": "Housing News", "url": "https://example.com/feed/"}],
            "instagram_rss": {"tags": ["注文住宅"], "provider": "rss.app", "urls": ["https://rss.app/a.xml"]},
            "x_queries": [],
            "youtube_channels": []
        }"#;
        let cfg = parse_sources(json, "json").unwrap();
        assert_eq!(cfg.press_release_queries, vec!["住宅".to_string()]);
        assert_eq!(cfg.media_rss.len(), 1);
        assert_eq!(cfg.social_rss.urls.len(), 1);
        assert_eq!(cfg.press_release_limit, 5);
        assert_eq!(cfg.press_release_base(), DEFAULT_PRESS_RELEASE_BASE);
    }

    #[test]
    fn companies_in_toml_and_json() {
        let toml = r#"
            [[companies]]
            name = "Acme Homes"
            domain = "acme.example"
            paths = ["/news", "products"]
        "#;
        let list = parse_companies(toml, "toml").unwrap();
        assert_eq!(
            list[0].page_urls(),
            vec![
                "https://acme.example/news".to_string(),
                "https://acme.example/products".to_string()
            ]
        );

        let json = r#"[{"name":"B","domain":"b.example","paths":["/"]},{"name":"C","domain":" ","paths":[]}]"#;
        let list = parse_companies(json, "json").unwrap();
        assert_eq!(list.len(), 1);
    }
}
