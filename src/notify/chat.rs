// src/notify/chat.rs
//! Chat webhook with card messages (header, timestamp subtitle, paragraphs).

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{Notice, Notifier};

pub struct ChatNotifier {
    webhook_url: String,
    client: Client,
    offset: FixedOffset,
}

impl ChatNotifier {
    pub fn new(webhook_url: String, offset: FixedOffset) -> Self {
        Self {
            webhook_url,
            client: Client::new(),
            offset,
        }
    }

    pub fn card(&self, notice: &Notice) -> Value {
        let subtitle = crate::dates::display_local(Utc::now(), self.offset);
        let mut widgets: Vec<Value> = match notice {
            Notice::Success(s) => {
                let mut w = vec![json!({ "textParagraph": { "text": s.summary } })];
                if !s.metrics.is_empty() {
                    let rows = s
                        .metrics
                        .iter()
                        .map(|(k, v)| format!("• {k}: {}", super::fmt_metric(*v)))
                        .collect::<Vec<_>>()
                        .join("<br>");
                    w.push(json!({ "textParagraph": { "text": format!("<b>Metrics:</b><br>{rows}") } }));
                }
                w
            }
            Notice::Error(e) => {
                let mut w = vec![json!({ "textParagraph": { "text": format!("<b>Error:</b><br>{}", e.error) } })];
                if let Some(d) = e.details_text() {
                    w.push(json!({ "textParagraph": { "text": format!("<b>Details:</b><br><code>{d}</code>") } }));
                }
                w.push(json!({ "textParagraph": { "text": "⚠️ <b>Action required.</b> Check the service logs." } }));
                w
            }
            Notice::Report(r) => vec![json!({ "textParagraph": { "text": r.summary } })],
        };
        if let Notice::Report(r) = notice {
            if let Some(url) = &r.web_url {
                widgets.push(json!({ "buttons": [ { "textButton": {
                    "text": "Open web edition",
                    "onClick": { "openLink": { "url": url } }
                } } ] }));
            }
        }
        json!({
            "text": notice.headline(),
            "cards": [ {
                "header": { "title": notice.headline(), "subtitle": subtitle },
                "sections": [ { "widgets": widgets } ]
            } ]
        })
    }
}

#[async_trait::async_trait]
impl Notifier for ChatNotifier {
    async fn send(&self, notice: &Notice) -> Result<()> {
        self.client
            .post(&self.webhook_url)
            .timeout(Duration::from_secs(10))
            .json(&self.card(notice))
            .send()
            .await
            .context("chat post")?
            .error_for_status()
            .context("chat non-2xx")?;
        tracing::info!(headline = %notice.headline(), "chat notification sent");
        Ok(())
    }

    fn channel(&self) -> &'static str {
        "chat"
    }
}
