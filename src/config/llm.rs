// src/config/llm.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::Path};

use anyhow::Context;

use crate::llm::pricing::{GEMINI_FLASH, SONNET};
use crate::llm::ModelPrice;

pub const DEFAULT_PATH: &str = "config/llm.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Claude,
    Gemini,
    Mock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub provider: ProviderKind,
    pub model: String,
    /// Only for pointing at a proxy or a test server.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_analysis() -> ProviderSettings {
    ProviderSettings {
        provider: ProviderKind::Claude,
        model: SONNET.to_string(),
        base_url: None,
    }
}

fn default_extraction() -> ProviderSettings {
    ProviderSettings {
        provider: ProviderKind::Gemini,
        model: GEMINI_FLASH.to_string(),
        base_url: None,
    }
}

/// Which provider/model serves which job. API keys are never stored here;
/// they are read from `ANTHROPIC_API_KEY` / `GEMINI_API_KEY` on first call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_analysis")]
    pub analysis: ProviderSettings,
    #[serde(default = "default_extraction")]
    pub extraction: ProviderSettings,
    /// Per-model price overrides (USD per 1M tokens).
    #[serde(default)]
    pub prices: HashMap<String, ModelPrice>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            analysis: default_analysis(),
            extraction: default_extraction(),
            prices: HashMap::new(),
        }
    }
}

impl LlmConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading llm config from {}", path.display()))?;
        let mut cfg: LlmConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing llm config {}", path.display()))?;

        // Blank model names fall back to the provider default.
        for (settings, fallback) in [
            (&mut cfg.analysis, default_analysis()),
            (&mut cfg.extraction, default_extraction()),
        ] {
            if settings.model.trim().is_empty() {
                settings.model = match settings.provider {
                    ProviderKind::Gemini => GEMINI_FLASH.to_string(),
                    _ => fallback.model,
                };
            }
        }
        cfg.prices
            .retain(|_, p| p.input_per_million >= 0.0 && p.output_per_million >= 0.0);
        Ok(cfg)
    }

    /// `config/llm.json` when present, defaults otherwise.
    pub fn load_default() -> Self {
        let path = Path::new(DEFAULT_PATH);
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = ?e, "invalid llm config, using defaults");
                Self::default()
            }
        }
    }
}
