//! Error taxonomy shared by the pipeline stages.
//!
//! The two external boundaries (LLM gateway, content store) get their own typed
//! errors; `PipelineError` flattens them into what stage callers and the HTTP
//! surface report. Duplicate inserts are not errors at all, see
//! [`crate::store::InsertOutcome`].

use thiserror::Error;

/// Upstream bodies are cut to this many characters before they land in an error.
pub const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Required credential or endpoint missing; raised on first use.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Remote API answered with a non-success status.
    #[error("upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// 2xx answer whose body did not match the provider's wire format.
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Anything else that escaped item-level handling inside a stage.
    #[error("{stage} failed: {message}")]
    Stage { stage: &'static str, message: String },
}

impl From<LlmError> for PipelineError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Configuration(msg) => PipelineError::Configuration(msg),
            LlmError::Upstream { status, body } => PipelineError::Upstream { status, body },
            other => PipelineError::Stage {
                stage: "llm",
                message: other.to_string(),
            },
        }
    }
}

impl PipelineError {
    pub fn stage(stage: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::Stage {
            stage,
            message: err.to_string(),
        }
    }
}

/// Cut `s` to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_errors_map_onto_pipeline_taxonomy() {
        let e: PipelineError = LlmError::Configuration("Missing ANTHROPIC_API_KEY".into()).into();
        assert!(matches!(e, PipelineError::Configuration(_)));

        let e: PipelineError = LlmError::Upstream {
            status: 529,
            body: "overloaded".into(),
        }
        .into();
        match e {
            PipelineError::Upstream { status, body } => {
                assert_eq!(status, 529);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("住宅トレンド", 2), "住宅");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
