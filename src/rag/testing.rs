//! Deterministic collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{RagError, RagResult};
use crate::llm::provider::TextGenerator;
use crate::rag::embedder::TextEmbedder;

pub const CAPITALS: [&str; 3] = [
    "Paris is the capital of France.",
    "Tokyo is the capital of Japan.",
    "Berlin is the capital of Germany.",
];

/// One-hot embedding per keyword found in the text; unmatched text maps to zeros.
pub struct KeywordEmbedder {
    keywords: Vec<&'static str>,
    dimension: usize,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn capitals() -> Self {
        Self::new(vec!["Paris", "Tokyo", "Berlin"], 3)
    }

    pub fn new(keywords: Vec<&'static str>, dimension: usize) -> Self {
        assert!(keywords.len() <= dimension);
        Self {
            keywords,
            dimension,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextEmbedder for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword-stub"
    }

    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut v = vec![0.0; self.dimension];
        for (i, kw) in self.keywords.iter().enumerate() {
            if text.contains(kw) {
                v[i] = 1.0;
            }
        }
        Ok(v)
    }
}

/// Fails on any text containing `marker`; otherwise embeds to `[len, 1.0]`.
pub struct FailingEmbedder {
    pub marker: &'static str,
}

#[async_trait]
impl TextEmbedder for FailingEmbedder {
    fn name(&self) -> &str {
        "failing-stub"
    }

    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        if text.contains(self.marker) {
            return Err(RagError::embedding("503 Service Unavailable"));
        }
        Ok(vec![text.len() as f32, 1.0])
    }
}

/// Embeds `"chunk N"` to `[N, 1.0]`, finishing later chunks first, and
/// records the peak number of concurrent calls.
#[derive(Default)]
pub struct SlowEmbedder {
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

#[async_trait]
impl TextEmbedder for SlowEmbedder {
    fn name(&self) -> &str {
        "slow-stub"
    }

    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        let n: u64 = text
            .trim_start_matches("chunk ")
            .parse()
            .map_err(RagError::embedding)?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20u64.saturating_sub(n))).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![n as f32, 1.0])
    }
}

/// Never answers; used to exercise collaborator timeouts.
pub struct HangingEmbedder;

#[async_trait]
impl TextEmbedder for HangingEmbedder {
    fn name(&self) -> &str {
        "hanging-stub"
    }

    async fn embed(&self, _text: &str) -> RagResult<Vec<f32>> {
        std::future::pending().await
    }
}

/// Records every prompt; answers with a fixed reply or fails.
pub struct RecordingGenerator {
    reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    fn name(&self) -> &str {
        "recording-stub"
    }

    async fn generate(&self, prompt: &str) -> RagResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply
            .clone()
            .ok_or_else(|| RagError::generation("429 Too Many Requests"))
    }
}
