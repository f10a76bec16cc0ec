// tests/ingest_providers.rs
//
// All four fetchers against one stub server, admitted through fetch_all.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use insight_pipeline::config::{CompanyConfig, SourcesConfig};
use insight_pipeline::ingest::{build_fetchers, fetch_all};
use insight_pipeline::model::SourceType;
use insight_pipeline::store::{ContentStore, MemoryStore};

const LISTING: &str = r#"<html><body><ul class="list-article">
  <li><a href="/main/html/rd/p/1.html"><h3>Acme opens ZEH showroom</h3></a>
      <span class="name">Acme Homes</span><time datetime="2025-05-06T10:00:00+09:00"></time></li>
</ul></body></html>"#;

const ARTICLE: &str =
    r#"<html><body><div class="content-body"><p>Showroom   opens in May.</p></div></body></html>"#;

const MEDIA: &str = r#"<?xml version="1.0"?><rss version="2.0"><channel>
<item><title>Builders &amp; lumber prices</title><link>https://media.test/1</link>
<description>&lt;p&gt;Lumber costs rise.&lt;/p&gt;</description><pubDate>Tue, 06 May 2025 01:00:00 +0000</pubDate></item>
<item><title>No link here</title></item>
</channel></rss>"#;

const SOCIAL: &str = r#"<?xml version="1.0"?><rss version="2.0"><channel>
<item><title>post</title><link>https://social.test/p/1</link>
<description>New home tour #zeh #solar #zeh</description></item>
</channel></rss>"#;

const COMPANY_PAGE: &str = r#"<html><head><title>Acme News</title></head><body>
<nav>menu</nav><h1>News</h1><p>Acme launches a   timber frame line.</p><footer>c</footer></body></html>"#;

async fn stub_server() -> MockServer {
    let server = MockServer::start().await;
    let routes: [(&str, u16, &str); 6] = [
        ("/main/html/searchrlp/company_id/acme", 200, LISTING),
        ("/main/html/rd/p/1.html", 200, ARTICLE),
        ("/media.xml", 200, MEDIA),
        ("/social.xml", 200, SOCIAL),
        ("/news", 200, COMPANY_PAGE),
        ("/gone", 404, ""),
    ];
    for (p, status, body) in routes {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
    }
    server
}

fn sources(server: &MockServer) -> SourcesConfig {
    serde_json::from_value(json!({
        "press_release_queries": ["acme"],
        "press_release_base_url": server.uri(),
        "press_release_full_body": true,
        "media_rss": [{ "name": "media", "url": format!("{}/media.xml", server.uri()) }],
        "social_rss": { "urls": [format!("{}/social.xml", server.uri())] }
    }))
    .unwrap()
}

fn companies(server: &MockServer) -> Vec<CompanyConfig> {
    vec![CompanyConfig {
        name: "Acme Homes".into(),
        domain: server.address().to_string(),
        paths: vec!["/gone".into(), "/news".into()],
        scheme: "http".into(),
    }]
}

#[tokio::test]
async fn every_source_lands_in_the_store_once() {
    let server = stub_server().await;
    let fetchers = build_fetchers(&sources(&server), &companies(&server), Duration::ZERO).unwrap();
    assert_eq!(
        fetchers.iter().map(|f| f.source_type()).collect::<Vec<_>>(),
        vec![
            SourceType::PressRelease,
            SourceType::Media,
            SourceType::CompanySite,
            SourceType::Social
        ]
    );

    let store = MemoryStore::new(insight_pipeline::dates::offset_hours(9));
    let counts = fetch_all(&fetchers, &store).await.unwrap();
    assert_eq!((counts.fetched, counts.saved), (4, 4));

    let raws = store.list_unprocessed_raw(10).await.unwrap();
    let by = |st: SourceType| raws.iter().find(|r| r.source_type == st).unwrap();

    let pr = by(SourceType::PressRelease);
    assert_eq!(pr.content, "Acme opens ZEH showroom\n\nShowroom opens in May.");
    assert_eq!(pr.metadata["company"], "Acme Homes");
    assert_eq!(pr.metadata["published_at"], "2025-05-06T10:00:00+09:00");

    let media = by(SourceType::Media);
    assert_eq!(media.content, "Builders & lumber prices\n\nLumber costs rise.");
    assert_eq!(media.metadata["published_at"], "2025-05-06T01:00:00Z");

    let site = by(SourceType::CompanySite);
    assert_eq!(site.metadata["title"], "Acme News");
    assert!(site.content.contains("Acme launches a timber frame line."));
    assert!(!site.content.contains("menu"));

    let social = by(SourceType::Social);
    assert_eq!(social.metadata["hashtags"], json!(["zeh", "solar"]));
    assert_eq!(social.content, "New home tour #zeh #solar #zeh");

    // Second pass: everything is already known.
    let again = fetch_all(&fetchers, &store).await.unwrap();
    assert_eq!((again.fetched, again.saved, again.skipped), (4, 0, 4));
}

#[tokio::test]
async fn unreachable_feed_is_skipped_not_fatal() {
    let server = stub_server().await;
    let cfg: SourcesConfig = serde_json::from_value(json!({
        "media_rss": [
            { "name": "dead", "url": format!("{}/missing.xml", server.uri()) },
            { "name": "media", "url": format!("{}/media.xml", server.uri()) }
        ]
    }))
    .unwrap();
    let fetchers = build_fetchers(&cfg, &[], Duration::ZERO).unwrap();
    let store = MemoryStore::new(insight_pipeline::dates::offset_hours(9));
    let counts = fetch_all(&fetchers, &store).await.unwrap();
    assert_eq!(counts.saved, 1);
}
