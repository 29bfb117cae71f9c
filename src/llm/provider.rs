use async_trait::async_trait;

use crate::errors::RagResult;

/// Prompt → completion. The answer pipeline returns whatever this produces verbatim.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> RagResult<String>;
}
