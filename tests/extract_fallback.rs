// tests/extract_fallback.rs
use std::sync::Arc;

use insight_pipeline::error::LlmError;
use insight_pipeline::extract::{extract_with_rules, Extractor};
use insight_pipeline::llm::{Completion, LlmGateway, MockProvider, PriceTable};
use insight_pipeline::model::ExtractorKind;

fn gateway(provider: MockProvider) -> Arc<LlmGateway> {
    Arc::new(LlmGateway::with_provider(
        Arc::new(provider),
        "gemini-1.5-flash",
        PriceTable::default(),
    ))
}

#[test]
fn plain_string_comes_back_collapsed() {
    for input in ["hello", "  two\twords ", "<<not really markup", "a < b and c > d"] {
        let out = extract_with_rules(input);
        assert!(!out.text.is_empty(), "input {input:?}");
        assert!(out.tables.is_empty());
        assert!(out.images.is_empty());
    }
    assert_eq!(extract_with_rules("  two\twords ").text, "two words");
}

#[tokio::test]
async fn llm_error_falls_back_to_rules_on_original_content() {
    let ex = Extractor::new(Some(gateway(MockProvider::scripted(|_| {
        Err(LlmError::Upstream {
            status: 503,
            body: "down".into(),
        })
    }))));
    let out = ex.extract("<p>Solar  roof</p><script>x()</script>", true).await;
    assert_eq!(out.text, "Solar roof");
    assert_eq!(out.extractor, ExtractorKind::Rule);
}

#[tokio::test]
async fn unparsable_llm_answer_falls_back() {
    let ex = Extractor::new(Some(gateway(MockProvider::scripted(|_| {
        Ok(Completion::text("Sorry, here is the text: Solar roof"))
    }))));
    let out = ex.extract("Solar roof", true).await;
    assert_eq!(out.text, "Solar roof");
    assert_eq!(out.extractor, ExtractorKind::Rule);
}

#[tokio::test]
async fn llm_path_only_sees_a_bounded_prefix() {
    let ex = Extractor::new(Some(gateway(MockProvider::scripted(|call| {
        assert!(call.prompt.chars().count() < 6_000);
        Ok(Completion::text(
            "```json\n{\"text\":\"Model  A launched\",\"tables\":[{\"rows\":1}],\"images\":[{\"url\":\"/a.jpg\",\"alt\":\"front\"}]}\n```",
        ))
    }))));
    let long = "x".repeat(20_000);
    let out = ex.extract(&long, true).await;
    assert_eq!(out.extractor, ExtractorKind::Llm);
    assert_eq!(out.text, "Model A launched");
    assert_eq!(out.tables, vec![r#"{"rows":1}"#.to_string()]);
    assert_eq!(out.images[0].caption, "front");
}

#[tokio::test]
async fn rule_path_is_used_when_llm_not_requested() {
    let provider = Arc::new(MockProvider::canned());
    let gw = Arc::new(LlmGateway::with_provider(
        provider.clone(),
        "m",
        PriceTable::default(),
    ));
    let ex = Extractor::new(Some(gw));
    let out = ex.extract("<p>plain</p>", false).await;
    assert_eq!(out.extractor, ExtractorKind::Rule);
    assert_eq!(provider.calls(), 0);
}
