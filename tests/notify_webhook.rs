// tests/notify_webhook.rs
//
// Webhook channels against a stub server. Delivery failures stay inside the
// multiplexer.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use insight_pipeline::dates::offset_hours;
use insight_pipeline::notify::chat::ChatNotifier;
use insight_pipeline::notify::discord::DiscordNotifier;
use insight_pipeline::notify::slack::SlackNotifier;
use insight_pipeline::notify::{Notice, NotifierMux, ReportNotice};

async fn bodies(server: &MockServer, at: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == at)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn chat_error_card_has_header_details_and_action() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mux = NotifierMux::empty().with(Arc::new(ChatNotifier::new(
        format!("{}/chat", server.uri()),
        offset_hours(9),
    )));
    let n = Notice::error(
        "daily:analyze",
        "upstream error (500): boom",
        Some(json!({ "blob": "y".repeat(1_000) })),
    );
    assert_eq!(mux.notify(&n).await, 1);

    let sent = bodies(&server, "/chat").await;
    let card = &sent[0]["cards"][0];
    assert_eq!(card["header"]["title"], "🚨 daily:analyze failed");
    assert!(card["header"]["subtitle"].as_str().unwrap().len() >= 10);
    let widgets = card["sections"][0]["widgets"].as_array().unwrap();
    assert_eq!(widgets.len(), 3);
    assert!(widgets[0]["textParagraph"]["text"]
        .as_str()
        .unwrap()
        .contains("boom"));
    // Details are capped, so the 1000-char blob cannot appear whole.
    let details = widgets[1]["textParagraph"]["text"].as_str().unwrap();
    assert!(!details.contains(&"y".repeat(600)));
}

#[tokio::test]
async fn report_card_carries_web_button() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let chat = ChatNotifier::new(format!("{}/chat", server.uri()), offset_hours(9));
    let n = Notice::Report(ReportNotice {
        title: "Daily Insight 2025-03-03".into(),
        summary: "Headline".into(),
        web_url: Some("https://insight.test/daily".into()),
    });
    let card = chat.card(&n);
    let url = &card["cards"][0]["sections"][0]["widgets"][1]["buttons"][0]["textButton"]["onClick"]
        ["openLink"]["url"];
    assert_eq!(url, "https://insight.test/daily");
}

#[tokio::test]
async fn failing_channel_does_not_block_the_others() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/discord"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mux = NotifierMux::empty()
        .with(Arc::new(SlackNotifier::new(format!("{}/slack", server.uri()))))
        .with(Arc::new(
            DiscordNotifier::new(format!("{}/discord", server.uri())).with_timeout(2),
        ));
    let n = Notice::success(
        "crawl",
        "Crawl finished: 2 new item(s)",
        vec![("saved".into(), 2.0)],
    );
    assert_eq!(mux.notify(&n).await, 1);

    let discord = bodies(&server, "/discord").await;
    assert_eq!(discord[0]["embeds"][0]["title"], "✅ crawl completed");
    assert!(discord[0]["embeds"][0]["description"]
        .as_str()
        .unwrap()
        .contains("• saved: 2"));

    let slack = bodies(&server, "/slack").await;
    assert!(slack[0]["text"].as_str().unwrap().starts_with("*✅ crawl completed*"));
}

#[tokio::test]
async fn hung_slack_webhook_times_out_instead_of_stalling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let mux = NotifierMux::empty().with(Arc::new(
        SlackNotifier::new(format!("{}/slack", server.uri())).with_timeout(1),
    ));
    let n = Notice::success("crawl", "done", vec![]);
    let delivered = tokio::time::timeout(Duration::from_secs(10), mux.notify(&n))
        .await
        .expect("notify must return once the request times out");
    assert_eq!(delivered, 0);
}

#[serial_test::serial]
#[test]
fn from_env_picks_configured_channels_only() {
    for k in [
        "CHAT_WEBHOOK_URL",
        "SLACK_WEBHOOK_URL",
        "DISCORD_WEBHOOK_URL",
        "SMTP_HOST",
        "SMTP_USER",
        "SMTP_PASS",
        "NOTIFY_EMAIL_FROM",
        "NOTIFY_EMAIL_TO",
    ] {
        std::env::remove_var(k);
    }
    assert!(NotifierMux::from_env(offset_hours(9)).is_empty());

    std::env::set_var("CHAT_WEBHOOK_URL", "https://chat.test/hook");
    std::env::set_var("DISCORD_WEBHOOK_URL", "  ");
    // Partial SMTP config disables email instead of failing.
    std::env::set_var("SMTP_HOST", "smtp.test");
    let mux = NotifierMux::from_env(offset_hours(9));
    assert_eq!(mux.channel_names(), vec!["chat"]);

    for k in ["CHAT_WEBHOOK_URL", "DISCORD_WEBHOOK_URL", "SMTP_HOST"] {
        std::env::remove_var(k);
    }
}
