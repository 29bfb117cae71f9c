//! Retrieval core: exact vector index, aligned document store, corpus
//! persistence, building, retrieval and answer assembly.

pub mod builder;
pub mod corpus;
pub mod embedder;
pub mod index;
pub mod pipeline;
pub mod retriever;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{embed_corpus, CorpusBuilder};
pub use corpus::{Corpus, CorpusPaths};
pub use embedder::{OpenAiCompatibleEmbedder, TextEmbedder};
pub use index::{Metric, SearchHit, VectorIndex};
pub use pipeline::{AnswerConfig, AnswerPipeline};
pub use retriever::{retrieve, retrieve_within, RetrievedPassage};
pub use store::DocumentStore;
