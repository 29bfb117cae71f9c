use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{RagError, RagResult};

/// Text → fixed-length vector. Implementations should be deterministic for a
/// given model; search reproducibility depends on it.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Identifier used in logs (provider id from config.toml).
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> RagResult<Vec<f32>>;
}

/// Embedder speaking the OpenAI `/embeddings` wire format.
pub struct OpenAiCompatibleEmbedder {
    id: String,
    url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(
        id: String,
        url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> RagResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RagError::embedding)?;
        Ok(Self {
            id,
            url,
            api_key,
            model,
            client,
        })
    }
}

#[async_trait]
impl TextEmbedder for OpenAiCompatibleEmbedder {
    fn name(&self) -> &str {
        &self.id
    }

    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        tracing::debug!(
            provider = %self.id,
            model = %self.model,
            text_len = text.len(),
            "sending embedding request"
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(RagError::embedding)?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(RagError::embedding(format!("{status}: {err_body}")));
        }

        let json: serde_json::Value = response.json().await.map_err(RagError::embedding)?;
        parse_embedding(&json)
    }
}

/// Extract `data[0].embedding` from an OpenAI-style embeddings response.
fn parse_embedding(json: &serde_json::Value) -> RagResult<Vec<f32>> {
    let values = json["data"][0]["embedding"]
        .as_array()
        .ok_or_else(|| RagError::embedding("response has no data[0].embedding array"))?;

    let vector = values
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| RagError::embedding("embedding contains a non-numeric value"))?;

    if vector.is_empty() {
        return Err(RagError::embedding("embedding is empty"));
    }
    Ok(vector)
}
