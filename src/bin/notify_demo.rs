//! Sends a sample success, error and report notice through every channel
//! configured in the environment (log only when none are).

use insight_pipeline::notify::{Notice, NotifierMux, ReportNotice};
use serde_json::json;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();
    let offset = insight_pipeline::config::PipelineConfig::from_env().offset();
    let mux = NotifierMux::from_env(offset);

    let notices = [
        Notice::success(
            "notify-demo",
            "Demo crawl finished",
            vec![("fetched".into(), 12.0), ("saved".into(), 3.0)],
        ),
        Notice::error(
            "notify-demo",
            "upstream error (529): overloaded",
            Some(json!({ "stage": "analyze", "analyzed": 4 })),
        ),
        Notice::Report(ReportNotice {
            title: "Daily Insight (demo)".into(),
            summary: "Demo headline one.\nDemo headline two.".into(),
            web_url: std::env::var("REPORT_WEB_URL").ok(),
        }),
    ];

    for n in &notices {
        let delivered = mux.notify(n).await;
        println!("{} -> {delivered} channel(s)", n.headline());
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    }

    println!("notify-demo done");
}
