//! Deterministic providers for tests and `LLM_TEST_MODE=mock`.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{CallSpec, Completion, LlmProvider};
use crate::error::LlmError;

type Script = dyn Fn(&CallSpec<'_>) -> Result<Completion, LlmError> + Send + Sync;

pub struct MockProvider {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Answer every call with `f(call)`.
    pub fn scripted<F>(f: F) -> Self
    where
        F: Fn(&CallSpec<'_>) -> Result<Completion, LlmError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(f),
            calls: AtomicUsize::new(0),
        }
    }

    /// Plausible answers keyed on the `TASK:` line every pipeline prompt opens with.
    pub fn canned() -> Self {
        Self::scripted(|call| Ok(Completion::text(canned_answer(call.prompt))))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn canned_answer(prompt: &str) -> String {
    let task = prompt
        .lines()
        .next()
        .and_then(|l| l.trim().strip_prefix("TASK:"))
        .map(|t| t.trim().to_ascii_lowercase())
        .unwrap_or_default();
    match task.as_str() {
        "extract" => r#"{"text":"mock extracted text","tables":[],"images":[]}"#.to_string(),
        "classify" => r#"{"type":"product","company":"Mock Homes","product":"Mock House","price_band":"mid","specs":["ZEH"],"topic_tags":["zeh","solar"]}"#.to_string(),
        "compare" => "## Comparison (mock)\n\n- No material difference.".to_string(),
        "trend" => r#"{"trends":[{"keyword":"zeh","frequency":1,"change_rate":0.0,"hypothesis":"mock","next_observation":"mock"}],"summary":"mock trend"}"#.to_string(),
        "strategy" => r#"{"sales":[{"action":"mock","owner":"sales","deadline":"next week","reason":"mock"}],"design":[],"marketing":[],"product":[]}"#.to_string(),
        "newspaper" => "# Daily Insight (mock)\n\nMock headline one.\nMock headline two.\nMock headline three.".to_string(),
        _ => "mock response".to_string(),
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, call: CallSpec<'_>) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(&call)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
