use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::errors::{RagError, RagResult};
use crate::rag::corpus::Corpus;
use crate::rag::embedder::TextEmbedder;
use crate::rag::index::SearchHit;
use crate::rag::store::DocumentStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    pub id: usize,
    pub text: String,
    pub distance: f32,
}

/// Embed `query` and return the `k` nearest passages, most relevant first.
///
/// A query embedding whose length differs from the corpus dimension is a hard
/// `DimensionMismatch`; vectors are never padded or truncated to fit.
pub async fn retrieve(
    query: &str,
    k: usize,
    embedder: &dyn TextEmbedder,
    corpus: &Corpus,
) -> RagResult<Vec<RetrievedPassage>> {
    let query_vec = embedder.embed(query).await?;
    let hits = corpus.index().search(&query_vec, k)?;
    let passages = resolve_hits(&hits, corpus.store())?;

    tracing::debug!(
        k,
        returned = passages.len(),
        corpus = corpus.count(),
        "retrieval complete"
    );
    Ok(passages)
}

/// [`retrieve`] bounded by `limit`. Expiry is a retryable `EmbeddingService`
/// error, since the embedding call is the only remote step.
pub async fn retrieve_within(
    limit: Duration,
    query: &str,
    k: usize,
    embedder: &dyn TextEmbedder,
    corpus: &Corpus,
) -> RagResult<Vec<RetrievedPassage>> {
    with_timeout(limit, retrieve(query, k, embedder, corpus), |cause| {
        RagError::EmbeddingService { cause }
    })
    .await
}

pub(crate) async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = RagResult<T>>,
    on_timeout: impl FnOnce(String) -> RagError,
) -> RagResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(format!("timed out after {}s", limit.as_secs_f32()))),
    }
}

/// Pair each hit with its text. An unresolvable id means the index and
/// store were built apart.
pub fn resolve_hits(hits: &[SearchHit], store: &DocumentStore) -> RagResult<Vec<RetrievedPassage>> {
    hits.iter()
        .map(|hit| {
            Ok(RetrievedPassage {
                id: hit.id,
                text: store.get(hit.id)?.to_string(),
                distance: hit.distance,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::builder::embed_corpus;
    use crate::rag::index::{Metric, VectorIndex};
    use crate::rag::testing::{HangingEmbedder, KeywordEmbedder, CAPITALS};

    async fn capitals_corpus() -> Corpus {
        embed_corpus(&CAPITALS, &KeywordEmbedder::capitals(), 3, Metric::L2)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn returns_text_with_distances_in_order() {
        let corpus = capitals_corpus().await;
        let embedder = KeywordEmbedder::capitals();

        let passages = retrieve("Tokyo", 3, &embedder, &corpus).await.unwrap();
        assert_eq!(passages.len(), 3);
        assert_eq!(passages[0].text, CAPITALS[1]);
        assert_eq!(passages[0].distance, 0.0);
        // Remaining two are equidistant; ties resolve by id.
        assert_eq!(passages[1].id, 0);
        assert_eq!(passages[2].id, 2);
    }

    #[tokio::test]
    async fn oversized_k_is_capped() {
        let corpus = capitals_corpus().await;
        let passages = retrieve("Berlin", 50, &KeywordEmbedder::capitals(), &corpus)
            .await
            .unwrap();
        assert_eq!(passages.len(), 3);
        assert_eq!(passages[0].text, CAPITALS[2]);
    }

    #[tokio::test]
    async fn empty_corpus_returns_no_passages() {
        let corpus = Corpus::from_parts(VectorIndex::new(3).unwrap(), DocumentStore::new()).unwrap();
        let passages = retrieve("Paris", 3, &KeywordEmbedder::capitals(), &corpus)
            .await
            .unwrap();
        assert!(passages.is_empty());
    }

    #[tokio::test]
    async fn query_from_a_different_model_is_rejected() {
        let wide = KeywordEmbedder::new(vec!["Paris", "Tokyo", "Berlin"], 8);
        let corpus = embed_corpus(&CAPITALS, &wide, 1, Metric::L2).await.unwrap();
        let narrow = KeywordEmbedder::new(vec!["Paris"], 4);

        let err = retrieve("Paris", 1, &narrow, &corpus).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch { expected: 8, actual: 4 }
        ));
    }

    #[tokio::test]
    async fn hung_embedder_times_out_as_retryable() {
        let corpus = capitals_corpus().await;
        let err = retrieve_within(
            Duration::from_millis(20),
            "Paris",
            3,
            &HangingEmbedder,
            &corpus,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingService { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn retrieval_within_the_limit_matches_unbounded() {
        let corpus = capitals_corpus().await;
        let embedder = KeywordEmbedder::capitals();
        let bounded = retrieve_within(Duration::from_secs(5), "Tokyo", 2, &embedder, &corpus)
            .await
            .unwrap();
        let unbounded = retrieve("Tokyo", 2, &embedder, &corpus).await.unwrap();
        assert_eq!(bounded, unbounded);
    }

    #[test]
    fn desynchronised_pairs_cannot_reach_retrieval() {
        let mut index = VectorIndex::new(1).unwrap();
        index.add_batch(&[vec![0.0], vec![1.0]]).unwrap();
        let mut store = DocumentStore::new();
        store.append_batch(["only"]);

        let hits = index.search(&[1.0], 2).unwrap();
        assert!(matches!(
            resolve_hits(&hits, &store),
            Err(RagError::DocumentNotFound { id: 1, count: 1 })
        ));
        assert!(matches!(
            Corpus::from_parts(index, store),
            Err(RagError::Misaligned { .. })
        ));
    }
}
