use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, ProviderEntry, RoleEntry, RolesConfig};
use crate::errors::{RagError, RagResult};
use crate::llm::provider::TextGenerator;
use crate::llm::providers::openai_compatible::OpenAiCompatibleGenerator;
use crate::llm::types::CallConfig;
use crate::rag::embedder::{OpenAiCompatibleEmbedder, TextEmbedder};

const DEFAULT_EMBEDDING_ENDPOINT: &str = "/embeddings";
const DEFAULT_GENERATION_ENDPOINT: &str = "/chat/completions";
const DEFAULT_TEMPERATURE: f64 = 0.1;

/// Resolves the `embedding` and `generation` roles from config.toml into
/// concrete collaborators. Holds no global state; build one per config.
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderEntry>,
    api_keys: HashMap<String, String>,
    roles: RolesConfig,
}

impl ProviderRegistry {
    /// API keys are read from environment variables named `RAGCORE_<ID>_API_KEY`,
    /// falling back to `api_key` in the provider entry.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_key_lookup(config, |var| std::env::var(var).ok())
    }

    fn with_key_lookup(config: &AppConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_keys = config
            .providers
            .iter()
            .map(|(id, entry)| {
                let key = lookup(&format!("RAGCORE_{}_API_KEY", id.to_uppercase()))
                    .unwrap_or_else(|| entry.api_key.clone().unwrap_or_default());
                (id.clone(), key)
            })
            .collect();
        Self {
            providers: config.providers.clone(),
            api_keys,
            roles: config.roles.clone(),
        }
    }

    pub fn embedder(&self) -> RagResult<Arc<dyn TextEmbedder>> {
        let role = require_role("embedding", self.roles.embedding.as_ref())?;
        let (entry, api_key) = self.provider_for("embedding", role)?;
        let url = endpoint_url(
            &entry.api_base,
            role.endpoint.as_deref().unwrap_or(DEFAULT_EMBEDDING_ENDPOINT),
        );
        tracing::debug!(provider = %role.provider, model = %role.model, url = %url, "resolved embedding role");
        let embedder = OpenAiCompatibleEmbedder::new(
            role.provider.clone(),
            url,
            api_key,
            role.model.clone(),
            Duration::from_secs(entry.timeout_secs),
        )?;
        Ok(Arc::new(embedder))
    }

    pub fn generator(&self) -> RagResult<Arc<dyn TextGenerator>> {
        let role = require_role("generation", self.roles.generation.as_ref())?;
        let (entry, api_key) = self.provider_for("generation", role)?;
        let url = endpoint_url(
            &entry.api_base,
            role.endpoint.as_deref().unwrap_or(DEFAULT_GENERATION_ENDPOINT),
        );
        let call = CallConfig {
            model: role.model.clone(),
            stream: role.stream,
            temperature: role.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        };
        tracing::debug!(
            provider = %role.provider,
            model = %call.model,
            stream = call.stream,
            temperature = call.temperature,
            "resolved generation role"
        );
        let generator = OpenAiCompatibleGenerator::new(
            role.provider.clone(),
            url,
            api_key,
            call,
            Duration::from_secs(entry.timeout_secs),
        )?;
        Ok(Arc::new(generator))
    }

    fn provider_for(&self, role: &str, entry: &RoleEntry) -> RagResult<(&ProviderEntry, String)> {
        let provider = self.providers.get(&entry.provider).ok_or_else(|| {
            RagError::Config(format!(
                "Role '{}' references unknown provider '{}'",
                role, entry.provider
            ))
        })?;
        let key = self.api_keys.get(&entry.provider).cloned().unwrap_or_default();
        Ok((provider, key))
    }
}

fn require_role<'a>(name: &str, entry: Option<&'a RoleEntry>) -> RagResult<&'a RoleEntry> {
    entry.ok_or_else(|| RagError::Config(format!("[roles.{name}] is not configured")))
}

fn endpoint_url(api_base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    format!(
        "{}/{}",
        api_base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
