//! Second-stage re-ranking.
//!
//! A fragment's whole-text embedding can drift away from its most relevant
//! passage, so candidates are re-scored against an embedding of their own
//! leading `prefix_chars` characters. The first-stage score is kept on the
//! candidate; the new score goes into `rerank_score`.

use std::cmp::Ordering;

use tracing::debug;

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::RetrievalCandidate;

pub const DEFAULT_PREFIX_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct ReRanker {
    embedder: Embedder,
    prefix_chars: usize,
}

impl ReRanker {
    pub fn new(embedder: Embedder) -> Self {
        Self {
            embedder,
            prefix_chars: DEFAULT_PREFIX_CHARS,
        }
    }

    pub fn with_prefix_chars(mut self, prefix_chars: usize) -> Self {
        self.prefix_chars = prefix_chars.max(1);
        self
    }

    /// Re-score `candidates` and return the best `k`, highest first.
    ///
    /// `query_vector` is reused when it matches the embedder's dimension;
    /// otherwise the question is embedded in the same batch as the
    /// candidate prefixes. An empty candidate list returns immediately
    /// without any embedding call.
    pub async fn rerank(
        &self,
        question: &str,
        query_vector: Option<&[f32]>,
        candidates: Vec<RetrievalCandidate>,
        k: usize,
    ) -> Vec<RetrievalCandidate> {
        if candidates.is_empty() || k == 0 {
            return Vec::new();
        }

        let cached = query_vector.filter(|v| v.len() == self.embedder.dims());

        let mut texts: Vec<String> = Vec::with_capacity(candidates.len() + 1);
        if cached.is_none() {
            texts.push(question.to_string());
        }
        texts.extend(
            candidates
                .iter()
                .map(|c| c.chunk.text.chars().take(self.prefix_chars).collect::<String>()),
        );

        let mut vectors = self.embedder.embed_batch(&texts).await.into_iter();
        let query: Vec<f32> = match cached {
            Some(v) => v.to_vec(),
            None => vectors.next().unwrap_or_default(),
        };

        let mut reranked: Vec<RetrievalCandidate> = candidates
            .into_iter()
            .zip(vectors)
            .map(|(mut c, v)| {
                c.rerank_score = Some(cosine_similarity(&query, &v));
                c
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.effective_score()
                .partial_cmp(&a.effective_score())
                .unwrap_or(Ordering::Equal)
                .then(b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
                .then(a.chunk.document_id.cmp(&b.chunk.document_id))
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        reranked.truncate(k);

        debug!(
            kept = reranked.len(),
            reused_query_vector = cached.is_some(),
            "re-ranked candidates"
        );
        reranked
    }
}
