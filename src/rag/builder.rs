use futures_util::stream::{self, StreamExt, TryStreamExt};

use crate::config::AppConfig;
use crate::errors::{RagError, RagResult};
use crate::rag::corpus::{Corpus, CorpusPaths};
use crate::rag::embedder::TextEmbedder;
use crate::rag::index::{Metric, VectorIndex};
use crate::rag::store::DocumentStore;

const DEFAULT_PARALLELISM: usize = 4;

/// Single-writer batch build: embed every chunk, then persist index and
/// store together. Callers must serialise builds that target the same paths.
pub struct CorpusBuilder {
    paths: CorpusPaths,
    parallelism: usize,
    metric: Metric,
}

impl CorpusBuilder {
    pub fn new(paths: CorpusPaths) -> Self {
        Self {
            paths,
            parallelism: DEFAULT_PARALLELISM,
            metric: Metric::default(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.corpus.paths())
            .with_parallelism(config.build.parallelism)
            .with_metric(config.corpus.metric)
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn paths(&self) -> &CorpusPaths {
        &self.paths
    }

    /// Build and persist. Any failure leaves the previously persisted pair
    /// (if any) untouched.
    pub async fn build<S>(&self, chunks: &[S], embedder: &dyn TextEmbedder) -> RagResult<Corpus>
    where
        S: AsRef<str> + Sync,
    {
        tracing::info!(
            chunks = chunks.len(),
            embedder = embedder.name(),
            parallelism = self.parallelism,
            "corpus build started"
        );
        let corpus = embed_corpus(chunks, embedder, self.parallelism, self.metric).await?;
        corpus.save(&self.paths)?;
        tracing::info!(
            count = corpus.count(),
            dimension = corpus.dimension(),
            "corpus build finished"
        );
        Ok(corpus)
    }
}

/// In-memory half of a build. Embeddings run with at most `parallelism`
/// requests in flight and are reassembled in chunk order, since ids are positional.
/// The first failure aborts the whole build.
pub async fn embed_corpus<S>(
    chunks: &[S],
    embedder: &dyn TextEmbedder,
    parallelism: usize,
    metric: Metric,
) -> RagResult<Corpus>
where
    S: AsRef<str> + Sync,
{
    if chunks.is_empty() {
        return Err(RagError::EmptyCorpus);
    }

    let embeddings: Vec<Vec<f32>> = stream::iter(chunks.iter().enumerate())
        .map(|(i, chunk)| async move {
            embedder.embed(chunk.as_ref()).await.map_err(|e| {
                tracing::error!(chunk = i, error = %e, "embedding failed, aborting build");
                e
            })
        })
        .buffered(parallelism.max(1))
        .try_collect()
        .await?;

    // The first embedding fixes the corpus dimension.
    let dimension = embeddings[0].len();
    if let Some((i, bad)) = embeddings
        .iter()
        .enumerate()
        .find(|(_, e)| e.len() != dimension)
    {
        tracing::error!(chunk = i, expected = dimension, actual = bad.len(), "inconsistent embedding dimension");
        return Err(RagError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }

    let mut index = VectorIndex::new(dimension)?.with_metric(metric);
    let mut store = DocumentStore::new();
    index.add_batch(&embeddings)?;
    store.append_batch(chunks.iter().map(|c| c.as_ref()));

    Corpus::from_parts(index, store)
}
