use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{RagError, RagResult};
use crate::rag::corpus::CorpusPaths;
use crate::rag::index::Metric;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    #[serde(default)]
    pub roles: RolesConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    #[serde(default)]
    pub display_name: String,
    pub api_base: String,
    /// Optional API key stored in config.toml (env var RAGCORE_<ID>_API_KEY wins).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Maps the two collaborator roles to provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    pub embedding: Option<RoleEntry>,
    pub generation: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    /// Path appended to the provider's api_base. Defaults per role.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Use SSE streaming (generation only).
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorpusConfig {
    #[serde(default)]
    pub index_path: Option<PathBuf>,
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default)]
    pub metric: Metric,
}

impl CorpusConfig {
    /// Configured paths, falling back to `<data_local_dir>/ragcore/corpus.{index,store}`.
    pub fn paths(&self) -> CorpusPaths {
        let base = default_data_dir();
        CorpusPaths {
            index_path: self
                .index_path
                .clone()
                .unwrap_or_else(|| base.join("corpus.index")),
            store_path: self
                .store_path
                .clone()
                .unwrap_or_else(|| base.join("corpus.store")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl RetrievalConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Upper bound on embedding requests in flight during a build.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_top_k() -> usize {
    3
}

fn default_max_context_chars() -> usize {
    4000
}

fn default_parallelism() -> usize {
    4
}

/// `~/.local/share/ragcore` on Linux (platform equivalent elsewhere),
/// falling back to the current working directory.
fn default_data_dir() -> PathBuf {
    match dirs::data_local_dir() {
        Some(dir) => dir.join("ragcore"),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn resolve_config_path() -> RagResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(RagError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> RagResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> RagResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    if config.build.parallelism == 0 {
        return Err(RagError::Config("build.parallelism must be at least 1".into()));
    }
    tracing::info!(
        path = %path.display(),
        providers = config.providers.len(),
        metric = ?config.corpus.metric,
        "config loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[providers.openai]
api_base = "https://api.openai.com/v1"

[roles.embedding]
provider = "openai"
model = "text-embedding-3-small"

[roles.generation]
provider = "openai"
model = "gpt-4o-mini"
stream = true

[corpus]
index_path = "/tmp/ragcore/test.index"
store_path = "/tmp/ragcore/test.store"
metric = "inner_product"

[retrieval]
top_k = 5
"#;

    #[test]
    fn parses_sample_with_defaults() {
        let cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        let provider = &cfg.providers["openai"];
        assert_eq!(provider.timeout_secs, 30);
        assert!(provider.api_key.is_none());
        assert!(cfg.roles.generation.as_ref().unwrap().stream);
        assert!(!cfg.roles.embedding.as_ref().unwrap().stream);
        assert_eq!(cfg.corpus.metric, Metric::InnerProduct);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.retrieval.max_context_chars, 4000);
        assert_eq!(cfg.build.parallelism, 4);
        assert_eq!(
            cfg.corpus.paths().index_path,
            PathBuf::from("/tmp/ragcore/test.index")
        );
    }

    #[test]
    fn shipped_example_parses() {
        let cfg: AppConfig = toml::from_str(include_str!("../config.example.toml")).unwrap();
        assert_eq!(cfg.roles.embedding.unwrap().provider, "openai");
        assert_eq!(cfg.build.parallelism, 4);
    }

    #[test]
    fn empty_config_gets_default_paths() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        let paths = cfg.corpus.paths();
        assert!(paths.index_path.ends_with("corpus.index"));
        assert!(paths.store_path.ends_with("corpus.store"));
        assert_eq!(cfg.corpus.metric, Metric::L2);
    }

    #[test]
    fn rejects_zero_parallelism() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[build]\nparallelism = 0\n").unwrap();
        assert!(matches!(load_config_from(&path), Err(RagError::Config(_))));
    }

    #[test]
    fn load_reads_an_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.retrieval.top_k, 5);
        assert_eq!(loaded.roles.generation.unwrap().model, "gpt-4o-mini");
    }
}
