//! Retrieval-augmented answering: retrieve, assemble a bounded context,
//! fill the prompt template, hand it to the generator.

use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::errors::{RagError, RagResult};
use crate::llm::provider::TextGenerator;
use crate::rag::corpus::Corpus;
use crate::rag::embedder::TextEmbedder;
use crate::rag::retriever::{self, with_timeout, RetrievedPassage};

pub const NO_CONTEXT_MARKER: &str = "No context available.";

const PASSAGE_SEPARATOR: &str = "\n";

#[derive(Debug, Clone)]
pub struct AnswerConfig {
    pub top_k: usize,
    /// Character budget for the joined context block.
    pub max_context_chars: usize,
    /// Applied to each embedding / generation call.
    pub request_timeout: Duration,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for AnswerConfig {
    fn from(cfg: &RetrievalConfig) -> Self {
        Self {
            top_k: cfg.top_k,
            max_context_chars: cfg.max_context_chars,
            request_timeout: cfg.request_timeout(),
        }
    }
}

/// Read-only over a shared corpus; clone the `Arc`s to serve many queries at once.
pub struct AnswerPipeline {
    corpus: Arc<Corpus>,
    embedder: Arc<dyn TextEmbedder>,
    generator: Arc<dyn TextGenerator>,
    config: AnswerConfig,
}

impl AnswerPipeline {
    pub fn new(
        corpus: Arc<Corpus>,
        embedder: Arc<dyn TextEmbedder>,
        generator: Arc<dyn TextGenerator>,
        config: AnswerConfig,
    ) -> Self {
        Self {
            corpus,
            embedder,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &AnswerConfig {
        &self.config
    }

    /// Top-k passages for `query`, bounded by the request timeout.
    pub async fn retrieve(&self, query: &str) -> RagResult<Vec<RetrievedPassage>> {
        retriever::retrieve_within(
            self.config.request_timeout,
            query,
            self.config.top_k,
            self.embedder.as_ref(),
            &self.corpus,
        )
        .await
    }

    pub async fn answer(&self, query: &str) -> RagResult<String> {
        let passages = self.retrieve(query).await?;
        let context = assemble_context(&passages, self.config.max_context_chars);
        if context.is_none() {
            tracing::warn!(
                retrieved = passages.len(),
                "no context for query, falling back to ungrounded generation"
            );
        }
        let prompt = build_prompt(context.as_deref().unwrap_or(NO_CONTEXT_MARKER), query);

        tracing::info!(
            passages = passages.len(),
            prompt_len = prompt.len(),
            generator = self.generator.name(),
            "generating answer"
        );
        with_timeout(
            self.config.request_timeout,
            self.generator.generate(&prompt),
            |cause| RagError::GenerationService { cause },
        )
        .await
    }
}

/// Join passages (already most-relevant first) within `max_chars`, counting
/// separators. Passages that do not fit are dropped from the tail; a first
/// passage longer than the whole budget is cut at the budget instead.
/// Returns `None` when nothing is left.
pub fn assemble_context(passages: &[RetrievedPassage], max_chars: usize) -> Option<String> {
    let mut context = String::new();
    let mut used = 0;

    for (i, passage) in passages.iter().enumerate() {
        let len = passage.text.chars().count();
        let sep = if i == 0 { 0 } else { PASSAGE_SEPARATOR.len() };

        if used + sep + len > max_chars {
            if i == 0 {
                context.extend(passage.text.chars().take(max_chars));
            }
            tracing::debug!(
                kept = i,
                dropped = passages.len() - i,
                max_chars,
                "context budget reached"
            );
            break;
        }

        if sep > 0 {
            context.push_str(PASSAGE_SEPARATOR);
        }
        context.push_str(&passage.text);
        used += sep + len;
    }

    (!context.is_empty()).then_some(context)
}

pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "You are an AI assistant. Use the following retrieved documents to answer the query.\n\n\
         Context:\n{context}\n\n\
         Query: {query}\n\n\
         Answer:"
    )
}
