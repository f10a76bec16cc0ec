use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{Notice, Notifier};

/// Discord caps embed descriptions at 4096 characters.
const DESCRIPTION_MAX: usize = 4000;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn from_notice(notice: &Notice) -> Self {
        let color = match notice {
            Notice::Success(_) => 0x2e_cc_71,
            Notice::Error(_) => 0xe7_4c_3c,
            Notice::Report(_) => 0x34_98_db,
        };
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: notice.headline(),
                description: crate::error::truncate_chars(&notice.lines().join("\n"), DESCRIPTION_MAX),
                color,
            }],
        }
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, notice: &Notice) -> Result<()> {
        let payload = DiscordWebhookPayload::from_notice(notice);
        let rsp = self
            .client
            .post(&self.webhook)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Discord webhook request failed: {e}"))?;
        rsp.error_for_status_ref()
            .map_err(|e| anyhow!("Discord webhook HTTP error: {e}"))?;
        Ok(())
    }

    fn channel(&self) -> &'static str {
        "discord"
    }
}
