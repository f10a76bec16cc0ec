//! LLM gateway: one provider-agnostic call shape, cost metering, lazy clients.
//!
//! A gateway owns a provider *factory*, not a provider. The factory runs on the
//! first `invoke` (that is where a missing API key surfaces) and its result is
//! memoized for the life of the gateway. There is no retry here; callers decide.

pub mod claude;
pub mod gemini;
pub mod json;
pub mod mock;
pub mod pricing;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::llm::{LlmConfig, ProviderKind, ProviderSettings};
use crate::error::LlmError;
use crate::lazy::Memo;

pub use mock::MockProvider;
pub use pricing::{estimate_tokens, ModelPrice, PriceTable};

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmResponse {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    /// Model that actually served the call.
    pub model: String,
}

/// Fully resolved call handed to a provider.
#[derive(Debug, Clone, Copy)]
pub struct CallSpec<'a> {
    pub prompt: &'a str,
    pub system: Option<&'a str>,
    pub model: &'a str,
    pub max_tokens: u32,
}

/// Raw provider answer; token counts are `None` when the API reports none.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens_in: None,
            tokens_out: None,
        }
    }

    pub fn with_usage(mut self, tokens_in: u64, tokens_out: u64) -> Self {
        self.tokens_in = Some(tokens_in);
        self.tokens_out = Some(tokens_out);
        self
    }
}

/// Exactly one outbound request per `complete`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, call: CallSpec<'_>) -> Result<Completion, LlmError>;
    fn name(&self) -> &'static str;
}

pub type DynProvider = Arc<dyn LlmProvider>;
type ProviderFactory = Box<dyn Fn() -> Result<DynProvider, LlmError> + Send + Sync>;

pub struct LlmGateway {
    default_model: String,
    prices: PriceTable,
    factory: ProviderFactory,
    provider: Memo<DynProvider>,
}

impl LlmGateway {
    pub fn new<F>(default_model: impl Into<String>, prices: PriceTable, factory: F) -> Self
    where
        F: Fn() -> Result<DynProvider, LlmError> + Send + Sync + 'static,
    {
        Self {
            default_model: default_model.into(),
            prices,
            factory: Box::new(factory),
            provider: Memo::new(),
        }
    }

    /// Gateway around an already built provider (tests, mock mode).
    pub fn with_provider(
        provider: DynProvider,
        default_model: impl Into<String>,
        prices: PriceTable,
    ) -> Self {
        Self::new(default_model, prices, move || Ok(provider.clone()))
    }

    /// Build from one provider section of the config; credentials are read
    /// from the environment only when the first call happens.
    pub fn from_settings(settings: &ProviderSettings, prices: PriceTable) -> Self {
        let kind = settings.provider;
        let base_url = settings.base_url.clone();
        let model = settings.model.clone();
        Self::new(model, prices, move || build_provider(kind, base_url.as_deref()))
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Drop the memoized provider; the next call rebuilds it.
    pub fn reset(&self) {
        self.provider.reset();
    }

    pub fn is_initialized(&self) -> bool {
        self.provider.is_initialized()
    }

    pub async fn invoke(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let provider = self.provider.get_or_try_init(|| (self.factory)())?;
        let model = req
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.default_model.as_str())
            .to_string();
        let call = CallSpec {
            prompt: &req.prompt,
            system: req.system.as_deref(),
            model: &model,
            max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        };

        debug!(
            provider = provider.name(),
            model = %model,
            prompt_chars = req.prompt.chars().count(),
            "llm call"
        );
        let started = Instant::now();
        let completion = provider.complete(call).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let tokens_in = completion.tokens_in.unwrap_or_else(|| {
            estimate_tokens(&req.prompt) + req.system.as_deref().map(estimate_tokens).unwrap_or(0)
        });
        let tokens_out = completion
            .tokens_out
            .unwrap_or_else(|| estimate_tokens(&completion.text));
        let cost_usd = self.prices.cost(&model, tokens_in, tokens_out);

        counter!("llm_calls_total", "model" => model.clone()).increment(1);
        counter!("llm_tokens_in_total").increment(tokens_in);
        counter!("llm_tokens_out_total").increment(tokens_out);
        histogram!("llm_cost_usd").record(cost_usd);
        info!(
            provider = provider.name(),
            model = %model,
            tokens_in,
            tokens_out,
            cost_usd,
            elapsed_ms,
            "llm call finished"
        );

        Ok(LlmResponse {
            text: completion.text,
            tokens_in,
            tokens_out,
            cost_usd,
            model,
        })
    }
}

fn test_mode_is_mock() -> bool {
    std::env::var("LLM_TEST_MODE")
        .map(|v| v.trim().eq_ignore_ascii_case("mock"))
        .unwrap_or(false)
}

fn read_key(var: &str) -> Result<String, LlmError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(LlmError::Configuration(format!("Missing {var} env var"))),
    }
}

/// Provider factory behind every configured gateway.
///
/// * `LLM_TEST_MODE=mock` returns the canned mock regardless of config.
/// * Otherwise the provider's API key must be present in the environment.
pub fn build_provider(kind: ProviderKind, base_url: Option<&str>) -> Result<DynProvider, LlmError> {
    if test_mode_is_mock() || kind == ProviderKind::Mock {
        return Ok(Arc::new(MockProvider::canned()));
    }
    match kind {
        ProviderKind::Claude => {
            let key = read_key("ANTHROPIC_API_KEY")?;
            let mut p = claude::ClaudeProvider::new(&key)?;
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Ok(Arc::new(p))
        }
        ProviderKind::Gemini => {
            let key = read_key("GEMINI_API_KEY")?;
            let mut p = gemini::GeminiProvider::new(&key)?;
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Ok(Arc::new(p))
        }
        ProviderKind::Mock => Ok(Arc::new(MockProvider::canned())),
    }
}

/// The two gateways the pipeline uses: analysis (classify and friends) and
/// extraction (image-heavy sources).
#[derive(Clone)]
pub struct LlmGateways {
    pub analysis: Arc<LlmGateway>,
    pub extraction: Arc<LlmGateway>,
}

impl LlmGateways {
    pub fn from_config(cfg: &LlmConfig) -> Self {
        let prices = PriceTable::with_overrides(&cfg.prices);
        Self {
            analysis: Arc::new(LlmGateway::from_settings(&cfg.analysis, prices.clone())),
            extraction: Arc::new(LlmGateway::from_settings(&cfg.extraction, prices)),
        }
    }

    /// Both roles served by the same gateway.
    pub fn single(gateway: Arc<LlmGateway>) -> Self {
        Self {
            analysis: gateway.clone(),
            extraction: gateway,
        }
    }

    pub fn reset(&self) {
        self.analysis.reset();
        self.extraction.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn factory_runs_once_and_failures_are_not_cached() {
        let builds = Arc::new(AtomicUsize::new(0));
        let b = builds.clone();
        let gw = LlmGateway::new("m", PriceTable::default(), move || {
            let n = b.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(LlmError::Configuration("Missing ANTHROPIC_API_KEY env var".into()))
            } else {
                Ok(Arc::new(MockProvider::scripted(|_| Ok(Completion::text("ok"))))
                    as DynProvider)
            }
        });

        let err = gw.invoke(LlmRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, LlmError::Configuration(_)));
        assert!(!gw.is_initialized());

        gw.invoke(LlmRequest::new("hi")).await.unwrap();
        gw.invoke(LlmRequest::new("hi")).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn estimates_tokens_when_provider_reports_none() {
        let gw = LlmGateway::with_provider(
            Arc::new(MockProvider::scripted(|_| Ok(Completion::text("12345678")))),
            pricing::GEMINI_FLASH,
            PriceTable::default(),
        );
        let r = gw
            .invoke(LlmRequest::new("abcdefghi").system("xyz"))
            .await
            .unwrap();
        // ceil(9/4) + ceil(3/4)
        assert_eq!(r.tokens_in, 4);
        assert_eq!(r.tokens_out, 2);
        assert_eq!(r.model, pricing::GEMINI_FLASH);
    }

    #[tokio::test]
    async fn request_model_overrides_default() {
        let gw = LlmGateway::with_provider(
            Arc::new(MockProvider::scripted(|call| {
                Ok(Completion::text(call.model.to_string()).with_usage(1_000_000, 1_000_000))
            })),
            pricing::SONNET,
            PriceTable::default(),
        );
        let r = gw
            .invoke(LlmRequest::new("x").model(pricing::HAIKU))
            .await
            .unwrap();
        assert_eq!(r.text, pricing::HAIKU);
        assert_eq!(r.model, pricing::HAIKU);
        assert_eq!(r.cost_usd, 1.5);
    }
}
