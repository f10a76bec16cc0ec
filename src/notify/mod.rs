// src/notify/mod.rs
//! Human-facing notices (success, error, daily report) fanned out to every
//! configured channel. Delivery is best effort: a failed channel is logged and
//! counted, never returned to the pipeline.

pub mod chat;
pub mod discord;
pub mod email;
pub mod slack;

use std::sync::Arc;

use chrono::FixedOffset;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;

use crate::error::{truncate_chars, MAX_ERROR_BODY_CHARS};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessNotice {
    pub job: String,
    pub summary: String,
    /// Ordered (label, value) pairs.
    pub metrics: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorNotice {
    pub job: String,
    pub error: String,
    pub details: Option<Value>,
}

impl ErrorNotice {
    /// Pretty JSON of `details`, cut to 500 characters.
    pub fn details_text(&self) -> Option<String> {
        let d = self.details.as_ref()?;
        let s = serde_json::to_string_pretty(d).unwrap_or_else(|_| d.to_string());
        Some(truncate_chars(&s, MAX_ERROR_BODY_CHARS))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportNotice {
    pub title: String,
    pub summary: String,
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    Success(SuccessNotice),
    Error(ErrorNotice),
    Report(ReportNotice),
}

pub fn fmt_metric(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v:.4}")
    }
}

impl Notice {
    pub fn success(job: impl Into<String>, summary: impl Into<String>, metrics: Vec<(String, f64)>) -> Self {
        Notice::Success(SuccessNotice {
            job: job.into(),
            summary: summary.into(),
            metrics,
        })
    }

    pub fn error(job: impl Into<String>, error: impl Into<String>, details: Option<Value>) -> Self {
        Notice::Error(ErrorNotice {
            job: job.into(),
            error: error.into(),
            details,
        })
    }

    pub fn headline(&self) -> String {
        match self {
            Notice::Success(s) => format!("✅ {} completed", s.job),
            Notice::Error(e) => format!("🚨 {} failed", e.job),
            Notice::Report(r) => format!("📰 {}", r.title),
        }
    }

    /// Plain-text body lines shared by the text-only channels.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Notice::Success(s) => {
                let mut v = vec![s.summary.clone()];
                v.extend(
                    s.metrics
                        .iter()
                        .map(|(k, val)| format!("• {k}: {}", fmt_metric(*val))),
                );
                v
            }
            Notice::Error(e) => {
                let mut v = vec![format!("Error: {}", e.error)];
                if let Some(d) = e.details_text() {
                    v.push(format!("Details: {d}"));
                }
                v.push("Action required: check the service logs.".to_string());
                v
            }
            Notice::Report(r) => {
                let mut v = vec![r.summary.clone()];
                if let Some(u) = &r.web_url {
                    v.push(format!("Web: {u}"));
                }
                v
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Error(_))
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notice: &Notice) -> anyhow::Result<()>;
    fn channel(&self) -> &'static str;
}

#[derive(Clone, Default)]
pub struct NotifierMux {
    channels: Vec<Arc<dyn Notifier>>,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl NotifierMux {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, n: Arc<dyn Notifier>) -> Self {
        self.channels.push(n);
        self
    }

    /// Every channel whose env configuration is complete:
    /// `CHAT_WEBHOOK_URL`, `SLACK_WEBHOOK_URL`, `DISCORD_WEBHOOK_URL`,
    /// `SMTP_HOST`+`SMTP_USER`+`SMTP_PASS`+`NOTIFY_EMAIL_FROM`+`NOTIFY_EMAIL_TO`.
    pub fn from_env(offset: FixedOffset) -> Self {
        let mut mux = Self::empty();
        if let Some(url) = env_nonempty("CHAT_WEBHOOK_URL") {
            mux = mux.with(Arc::new(chat::ChatNotifier::new(url, offset)));
        }
        if let Some(url) = env_nonempty("SLACK_WEBHOOK_URL") {
            mux = mux.with(Arc::new(slack::SlackNotifier::new(url)));
        }
        if let Some(url) = env_nonempty("DISCORD_WEBHOOK_URL") {
            mux = mux.with(Arc::new(discord::DiscordNotifier::new(url)));
        }
        match email::EmailSender::from_env() {
            Ok(Some(sender)) => mux = mux.with(Arc::new(sender)),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = ?e, "email channel misconfigured, disabled"),
        }
        tracing::info!(channels = ?mux.channel_names(), "notification channels");
        mux
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.channel()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Send to every channel; returns how many accepted it.
    pub async fn notify(&self, notice: &Notice) -> usize {
        if self.channels.is_empty() {
            if notice.is_error() {
                tracing::error!(notice = ?notice, "no notification channel configured, error notice not delivered");
            } else {
                tracing::warn!(headline = %notice.headline(), "no notification channel configured");
            }
            return 0;
        }
        let mut delivered = 0;
        for ch in &self.channels {
            match ch.send(notice).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    counter!("notify_failures_total", "channel" => ch.channel()).increment(1);
                    tracing::error!(error = ?e, channel = ch.channel(), notice = ?notice, "notification failed");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_details_are_truncated() {
        let n = ErrorNotice {
            job: "crawl".into(),
            error: "boom".into(),
            details: Some(serde_json::json!({ "blob": "x".repeat(2000) })),
        };
        assert_eq!(n.details_text().unwrap().chars().count(), MAX_ERROR_BODY_CHARS);
    }

    #[test]
    fn success_lines_format_integers_plainly() {
        let n = Notice::success(
            "crawl",
            "done",
            vec![("fetched".into(), 12.0), ("cost_usd".into(), 0.01234)],
        );
        assert_eq!(n.lines(), vec!["done", "• fetched: 12", "• cost_usd: 0.0123"]);
    }

    #[tokio::test]
    async fn empty_mux_delivers_nothing() {
        let n = Notice::error("crawl", "boom", None);
        assert_eq!(NotifierMux::empty().notify(&n).await, 0);
    }
}
