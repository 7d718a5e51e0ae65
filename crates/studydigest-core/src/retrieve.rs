//! First-stage vector retrieval.
//!
//! Embeds the query, scores every fragment in scope by cosine similarity
//! and keeps the top `min(k × overfetch_factor, overfetch_cap)`. The pool
//! is deliberately larger than `k` so the [`ReRanker`](crate::rerank::ReRanker)
//! has something to reorder.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::RetrieveError;
use crate::models::{RetrievalCandidate, Scope};
use crate::store::FragmentStore;

pub const DEFAULT_OVERFETCH_FACTOR: usize = 2;
pub const DEFAULT_OVERFETCH_CAP: usize = 10;

/// Output of the first stage.
#[derive(Debug, Clone, Default)]
pub struct FirstStage {
    /// Query embedding, reusable by the re-ranker. `None` when the scope
    /// held no fragments and the query was never embedded.
    pub query_vector: Option<Vec<f32>>,
    /// Candidates sorted by descending score.
    pub candidates: Vec<RetrievalCandidate>,
}

pub struct VectorRetriever {
    embedder: Embedder,
    store: Arc<dyn FragmentStore>,
    overfetch_factor: usize,
    overfetch_cap: usize,
}

impl VectorRetriever {
    /// Retriever over `store` with the default over-fetch factor and cap.
    pub fn new(embedder: Embedder, store: Arc<dyn FragmentStore>) -> Self {
        Self {
            embedder,
            store,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            overfetch_cap: DEFAULT_OVERFETCH_CAP,
        }
    }

    pub fn with_overfetch(mut self, factor: usize, cap: usize) -> Self {
        self.overfetch_factor = factor.max(1);
        self.overfetch_cap = cap.max(1);
        self
    }

    /// Candidate pool size for a final count of `k`.
    pub fn pool_size(&self, k: usize) -> usize {
        k.saturating_mul(self.overfetch_factor).min(self.overfetch_cap)
    }

    /// Rank the fragments in `scope` against `query`.
    ///
    /// # Errors
    ///
    /// Only store failures. An embedding outage degrades to a zero query
    /// vector, which scores every fragment `0.0`.
    pub async fn retrieve(
        &self,
        query: &str,
        scope: &Scope,
        k: usize,
    ) -> Result<FirstStage, RetrieveError> {
        let fragments = self.store.query(scope).await?;
        if fragments.is_empty() || k == 0 {
            debug!(scope = %scope.label(), "no fragments in scope");
            return Ok(FirstStage::default());
        }

        let query_vector = self.embedder.embed_one(query).await;

        let mut candidates: Vec<RetrievalCandidate> = fragments
            .into_iter()
            .map(|f| RetrievalCandidate {
                score: cosine_similarity(&query_vector, &f.vector),
                chunk: f.chunk,
                rerank_score: None,
            })
            .collect();
        let scored = candidates.len();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.chunk.document_id.cmp(&b.chunk.document_id))
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        candidates.truncate(self.pool_size(k));

        debug!(
            scope = %scope.label(),
            scored,
            kept = candidates.len(),
            "first-stage retrieval"
        );

        Ok(FirstStage {
            query_vector: Some(query_vector),
            candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::make_chunk;
    use crate::store::memory::InMemoryFragmentStore;
    use crate::testutil::FakeEmbedding;
    use crate::tokens::TokenEstimator;

    fn store_with(texts: &[(&str, &str)], fake: &FakeEmbedding) -> Arc<InMemoryFragmentStore> {
        let store = Arc::new(InMemoryFragmentStore::new());
        let estimator = TokenEstimator::default();
        for (i, (doc, text)) in texts.iter().enumerate() {
            let chunk = make_chunk(doc, i as i64, text, &estimator);
            store.insert("owner", chunk, fake.vector_for(text));
        }
        store
    }

    #[test]
    fn test_pool_size_is_doubled_and_capped() {
        let fake = Arc::new(FakeEmbedding::new(&["x"]));
        let r = VectorRetriever::new(Embedder::new(fake), Arc::new(InMemoryFragmentStore::new()));
        assert_eq!(r.pool_size(1), 2);
        assert_eq!(r.pool_size(3), 6);
        assert_eq!(r.pool_size(5), 10);
        assert_eq!(r.pool_size(8), 10);
    }

    #[tokio::test]
    async fn test_retrieve_sorts_by_similarity() {
        let fake = Arc::new(FakeEmbedding::new(&["cell", "war"]));
        let store = store_with(
            &[
                ("d1", "war war war"),
                ("d1", "cell cell war"),
                ("d1", "cell cell cell"),
                ("d1", "cell war war"),
            ],
            &fake,
        );
        let r = VectorRetriever::new(Embedder::new(fake.clone()), store);

        let out = r
            .retrieve("cell biology", &Scope::Owner("owner".into()), 1)
            .await
            .unwrap();
        assert_eq!(out.candidates.len(), 2);
        assert_eq!(out.candidates[0].chunk.text, "cell cell cell");
        assert_eq!(out.candidates[1].chunk.text, "cell cell war");
        assert!(out.candidates[0].score >= out.candidates[1].score);
        assert_eq!(out.query_vector, Some(vec![1.0, 0.0]));
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_scope_is_not_an_error() {
        let fake = Arc::new(FakeEmbedding::new(&["x"]));
        let r = VectorRetriever::new(
            Embedder::new(fake.clone()),
            Arc::new(InMemoryFragmentStore::new()),
        );
        let out = r
            .retrieve("anything", &Scope::document("owner", "missing"), 3)
            .await
            .unwrap();
        assert!(out.candidates.is_empty());
        assert!(out.query_vector.is_none());
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_embedding_outage_scores_zero() {
        let fake = Arc::new(FakeEmbedding::new(&["cell"]));
        let store = store_with(&[("d1", "cell"), ("d1", "cell cell")], &fake);
        let failing = Arc::new(FakeEmbedding::new(&["cell"]).failing());
        let r = VectorRetriever::new(Embedder::new(failing), store);

        let out = r.retrieve("cell", &Scope::Owner("owner".into()), 3).await.unwrap();
        assert_eq!(out.candidates.len(), 2);
        assert!(out.candidates.iter().all(|c| c.score == 0.0));
        // ties keep document order
        assert_eq!(out.candidates[0].chunk.chunk_index, 0);
    }
}
