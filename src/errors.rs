use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid index dimension: {0} (must be positive)")]
    InvalidDimension(usize),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index not found at {}", .0.display())]
    IndexNotFound(PathBuf),

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Document store not found at {}", .0.display())]
    StoreNotFound(PathBuf),

    #[error("Corrupt document store: {0}")]
    CorruptStore(String),

    #[error("Document {id} not found (store holds {count})")]
    DocumentNotFound { id: usize, count: usize },

    #[error("Index/store misaligned: index holds {index_count}, store holds {store_count}")]
    Misaligned { index_count: usize, store_count: usize },

    #[error("Cannot build a corpus from zero chunks")]
    EmptyCorpus,

    #[error("Embedding service error: {cause}")]
    EmbeddingService { cause: String },

    #[error("Generation service error: {cause}")]
    GenerationService { cause: String },

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl RagError {
    pub fn embedding<E: std::fmt::Display>(cause: E) -> Self {
        Self::EmbeddingService { cause: cause.to_string() }
    }

    pub fn generation<E: std::fmt::Display>(cause: E) -> Self {
        Self::GenerationService { cause: cause.to_string() }
    }

    /// Collaborator failures may be retried by the caller; everything else
    /// needs a rebuild or a code fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingService { .. } | Self::GenerationService { .. }
        )
    }
}

impl serde::Serialize for RagError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type RagResult<T> = Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_collaborator_failures_are_retryable() {
        assert!(RagError::embedding("503").is_retryable());
        assert!(RagError::generation("timed out").is_retryable());
        assert!(!RagError::DimensionMismatch { expected: 8, actual: 4 }.is_retryable());
        assert!(!RagError::CorruptIndex("short header".into()).is_retryable());
    }

    #[test]
    fn serializes_as_display_string() {
        let err = RagError::DocumentNotFound { id: 7, count: 3 };
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Document 7 not found (store holds 3)\"");
    }
}
