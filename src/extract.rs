// src/extract.rs
//! Raw content -> text, tables, images.
//!
//! The rule path never fails: markup is walked once, boilerplate subtrees are
//! skipped, and input with no usable body text comes back whitespace-collapsed.
//! The LLM path falls back to the rule path on any error.

use std::sync::Arc;

use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::analyze::prompts;
use crate::error::truncate_chars;
use crate::llm::{json, LlmGateway, LlmRequest};
use crate::model::{ExtractorKind, ImageRef};

const SKIP_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "nav", "footer", "header",
];
const SKIP_CLASSES: &[&str] = &["advertisement"];

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub tables: Vec<String>,
    pub images: Vec<ImageRef>,
    /// Path that produced this result (rule when the LLM path fell back).
    pub extractor: ExtractorKind,
}

pub fn collapse_whitespace(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re.replace_all(s.trim(), " ").into_owned()
}

fn is_boilerplate(el: &ElementRef<'_>) -> bool {
    let v = el.value();
    SKIP_TAGS.contains(&v.name()) || v.classes().any(|c| SKIP_CLASSES.contains(&c))
}

#[derive(Default)]
struct Walk {
    text: String,
    tables: Vec<String>,
    images: Vec<ImageRef>,
}

impl Walk {
    /// Document-order walk with an explicit stack; nesting depth is bounded by
    /// the heap, not the call stack.
    fn run(&mut self, root: ElementRef<'_>) {
        let mut stack = vec![*root];
        while let Some(node) = stack.pop() {
            match node.value() {
                Node::Text(t) => {
                    self.text.push_str(t);
                    self.text.push(' ');
                }
                Node::Element(_) => {
                    let Some(el) = ElementRef::wrap(node) else {
                        continue;
                    };
                    if is_boilerplate(&el) {
                        continue;
                    }
                    self.collect_assets(&el);
                    stack.extend(node.children().rev());
                }
                _ => {}
            }
        }
    }

    fn collect_assets(&mut self, el: &ElementRef<'_>) {
        match el.value().name() {
            "table" => self.tables.push(el.inner_html()),
            "img" => {
                let src = el.value().attr("src").unwrap_or_default().trim();
                if !src.is_empty() {
                    self.images.push(ImageRef {
                        url: src.to_string(),
                        caption: el.value().attr("alt").unwrap_or_default().trim().to_string(),
                    });
                }
            }
            _ => {}
        }
    }
}

/// Rule path. Never fails.
pub fn extract_with_rules(content: &str) -> Extraction {
    let doc = Html::parse_document(content);
    let mut walk = Walk::default();
    walk.run(doc.root_element());

    let mut text = collapse_whitespace(&walk.text);
    if text.is_empty() {
        text = collapse_whitespace(content);
    }
    Extraction {
        text,
        tables: walk.tables,
        images: walk.images,
        extractor: ExtractorKind::Rule,
    }
}

#[derive(Deserialize)]
struct LlmExtraction {
    #[serde(default)]
    text: String,
    #[serde(default)]
    tables: Vec<Value>,
    #[serde(default)]
    images: Vec<ImageRef>,
}

fn table_to_string(v: Value) -> String {
    match v {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

pub struct Extractor {
    gateway: Option<Arc<LlmGateway>>,
}

impl Extractor {
    pub fn new(gateway: Option<Arc<LlmGateway>>) -> Self {
        Self { gateway }
    }

    /// Rules only.
    pub fn rules_only() -> Self {
        Self { gateway: None }
    }

    pub async fn extract(&self, content: &str, use_llm: bool) -> Extraction {
        let out = match (&self.gateway, use_llm) {
            (Some(gw), true) => self.extract_with_llm(gw, content).await,
            _ => extract_with_rules(content),
        };
        let kind = match out.extractor {
            ExtractorKind::Llm => "llm",
            ExtractorKind::Rule => "rule",
            ExtractorKind::None => "none",
        };
        counter!("extract_processed_total", "extractor" => kind).increment(1);
        out
    }

    async fn extract_with_llm(&self, gw: &LlmGateway, content: &str) -> Extraction {
        let prefix = truncate_chars(content, prompts::EXTRACT_PREFIX_CHARS);
        let req = LlmRequest::new(prompts::extraction(&prefix));
        match gw.invoke(req).await {
            Ok(resp) => match json::parse_embedded::<LlmExtraction>(&resp.text) {
                Ok(x) if !x.text.trim().is_empty() => {
                    debug!(chars = x.text.len(), "llm extraction parsed");
                    return Extraction {
                        text: collapse_whitespace(&x.text),
                        tables: x.tables.into_iter().map(table_to_string).collect(),
                        images: x.images.into_iter().filter(|i| !i.url.is_empty()).collect(),
                        extractor: ExtractorKind::Llm,
                    };
                }
                Ok(_) => warn!("llm extraction returned empty text, using rules"),
                Err(e) => warn!(error = %e, "llm extraction unparsable, using rules"),
            },
            Err(e) => warn!(error = %e, "llm extraction failed, using rules"),
        }
        extract_with_rules(content)
    }
}
