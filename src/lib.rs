pub mod config;
pub mod errors;
pub mod llm;
pub mod rag;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::RagResult;
use crate::llm::registry::ProviderRegistry;
use crate::rag::corpus::Corpus;
use crate::rag::pipeline::{AnswerConfig, AnswerPipeline};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load the persisted corpus named by `config` and wire it to the configured
/// collaborators.
pub fn pipeline_from_config(config: &AppConfig) -> RagResult<AnswerPipeline> {
    let registry = ProviderRegistry::from_config(config);
    let corpus = Corpus::load(&config.corpus.paths(), config.corpus.metric)?;
    Ok(AnswerPipeline::new(
        Arc::new(corpus),
        registry.embedder()?,
        registry.generator()?,
        AnswerConfig::from(&config.retrieval),
    ))
}
