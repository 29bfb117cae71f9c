use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{RagError, RagResult};
use crate::llm::provider::TextGenerator;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, StreamChunkKind};

pub struct OpenAiCompatibleGenerator {
    id: String,
    url: String,
    api_key: String,
    call: CallConfig,
    client: reqwest::Client,
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        id: String,
        url: String,
        api_key: String,
        call: CallConfig,
        timeout: Duration,
    ) -> RagResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RagError::generation)?;
        Ok(Self {
            id,
            url,
            api_key,
            call,
            client,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    fn name(&self) -> &str {
        &self.id
    }

    async fn generate(&self, prompt: &str) -> RagResult<String> {
        let body = serde_json::json!({
            "model": self.call.model,
            "messages": [ChatMessage::user(prompt)],
            "stream": self.call.stream,
            "temperature": self.call.temperature,
        });

        tracing::debug!(
            provider = %self.id,
            model = %self.call.model,
            stream = self.call.stream,
            prompt_len = prompt.len(),
            "sending generation request"
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(RagError::generation)?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(RagError::generation(format!("{status}: {err_body}")));
        }

        if self.call.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleGenerator {
    /// Accumulate an SSE stream into the full completion text.
    async fn handle_stream(&self, response: reqwest::Response) -> RagResult<String> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = StreamAccumulator::default();

        while let Some(result) = byte_stream.next().await {
            let bytes = result.map_err(RagError::generation)?;
            acc.feed(&bytes)?;
            if acc.done {
                break;
            }
        }
        acc.finish()?;

        tracing::info!(
            content_len = acc.content.len(),
            reasoning_len = acc.reasoning_len,
            "generation stream complete"
        );
        Ok(acc.content)
    }

    async fn handle_json(&self, response: reqwest::Response) -> RagResult<String> {
        let json: serde_json::Value = response.json().await.map_err(RagError::generation)?;
        let content = parse_completion(&json)?;
        tracing::info!(content_len = content.len(), "generation JSON response received");
        Ok(content)
    }
}

fn parse_completion(json: &serde_json::Value) -> RagResult<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| RagError::generation("response has no choices[0].message.content"))
}

/// Splits raw SSE bytes into lines and folds content deltas together.
/// Lines are split on bytes so multi-byte characters may straddle chunks.
#[derive(Default)]
struct StreamAccumulator {
    line_buf: Vec<u8>,
    content: String,
    reasoning_len: usize,
    done: bool,
}

impl StreamAccumulator {
    fn feed(&mut self, bytes: &[u8]) -> RagResult<()> {
        for &b in bytes {
            if self.done {
                return Ok(());
            }
            if b == b'\n' {
                let line = std::mem::take(&mut self.line_buf);
                self.handle_line(&String::from_utf8_lossy(&line))?;
            } else {
                self.line_buf.push(b);
            }
        }
        Ok(())
    }

    /// Flush a final line that arrived without a trailing newline. A stream
    /// that closes without `[DONE]` or a `finish_reason` was cut off.
    fn finish(&mut self) -> RagResult<()> {
        if !self.done && !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.handle_line(&String::from_utf8_lossy(&line))?;
        }
        if !self.done {
            tracing::warn!(
                content_len = self.content.len(),
                "generation stream ended without a done signal"
            );
            return Err(RagError::generation(
                "stream ended before the completion was finished",
            ));
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> RagResult<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        if let Some(chunk) = sse_parser::parse_sse_line(line)? {
            match chunk.kind {
                StreamChunkKind::Content => self.content.push_str(&chunk.content),
                StreamChunkKind::Reasoning => self.reasoning_len += chunk.content.len(),
                StreamChunkKind::Done => self.done = true,
            }
        }
        Ok(())
    }
}
