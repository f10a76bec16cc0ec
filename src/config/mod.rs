// src/config/mod.rs
pub mod llm;
pub mod pipeline;
pub mod sources;

pub use llm::LlmConfig;
pub use pipeline::PipelineConfig;
pub use sources::{CompanyConfig, SourcesConfig};
