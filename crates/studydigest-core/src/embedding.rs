//! Embedding client trait, the dimension-enforcing [`Embedder`], and
//! vector utilities.
//!
//! Concrete HTTP clients (OpenAI, Ollama, plain JSON service) live in the
//! `studydigest` app crate. Every pipeline component receives vectors
//! through an [`Embedder`], never from a client directly, so all vectors
//! compared with each other come from one model and share one dimension.
//!
//! # Degradation
//!
//! [`Embedder::embed_batch`] never fails. Inputs are sent in sub-batches of
//! at most [`Embedder::batch_size`] texts. A failed sub-batch yields zero
//! vectors for its own texts only; a malformed entry (empty, wrong length,
//! non-finite values) yields a zero vector for that entry alone. Cosine
//! similarity against a zero vector is `0.0`, so a degraded text simply
//! ranks low.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::EmbeddingError;

/// An external embedding service.
///
/// One request carries many texts; the response must hold one vector per
/// input, in input order.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts in a single round trip.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Shared handle over the single embedding client of a pipeline.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Embedder {
    client: Arc<dyn EmbeddingClient>,
    batch_size: usize,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("model", &self.client.model_name())
            .field("dims", &self.client.dims())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Embedder {
    /// Wrap `client`. Without [`with_batch_size`](Self::with_batch_size)
    /// every input goes out in one request.
    pub fn new(client: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            client,
            batch_size: usize::MAX,
        }
    }

    /// Cap the number of texts per request. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub fn dims(&self) -> usize {
        self.client.dims()
    }

    /// Embed `texts`, substituting zero vectors for anything that fails.
    ///
    /// Always returns exactly `texts.len()` vectors of length
    /// [`dims`](Self::dims), in input order. An empty input makes no call.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut out = Vec::with_capacity(texts.len());
        for (index, batch) in texts.chunks(self.batch_size).enumerate() {
            match self.client.embed(batch).await {
                Ok(vectors) => out.extend(self.conform(batch.len(), vectors)),
                Err(e) => {
                    warn!(
                        model = self.model_name(),
                        batch = index,
                        texts = batch.len(),
                        error = %e,
                        "embedding call failed, using zero vectors"
                    );
                    out.extend(std::iter::repeat_with(|| zero_vector(self.dims())).take(batch.len()));
                }
            }
        }
        out
    }

    /// Embed a single text with the same degradation rules.
    pub async fn embed_one(&self, text: &str) -> Vec<f32> {
        self.embed_batch(&[text.to_string()])
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| zero_vector(self.dims()))
    }

    /// Embed `texts`, failing instead of degrading.
    ///
    /// Used when vectors are about to be persisted: a zero vector stored
    /// in the fragment store would silently never be retrieved. Any failed
    /// sub-batch fails the whole call.
    pub async fn try_embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors = self.client.embed(batch).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::Malformed(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for v in vectors {
                if !self.is_well_formed(&v) {
                    return Err(EmbeddingError::Malformed(format!(
                        "vector {} has {} values, expected {}",
                        out.len(),
                        v.len(),
                        self.dims()
                    )));
                }
                out.push(v);
            }
        }
        Ok(out)
    }

    fn conform(&self, expected: usize, vectors: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
        if vectors.len() != expected {
            warn!(
                model = self.model_name(),
                expected,
                received = vectors.len(),
                "embedding response count mismatch"
            );
        }
        let dims = self.dims();
        let mut out: Vec<Vec<f32>> = vectors
            .into_iter()
            .take(expected)
            .enumerate()
            .map(|(i, v)| {
                if self.is_well_formed(&v) {
                    v
                } else {
                    warn!(index = i, len = v.len(), dims, "malformed embedding, using zero vector");
                    zero_vector(dims)
                }
            })
            .collect();
        out.resize_with(expected, || zero_vector(dims));
        out
    }

    fn is_well_formed(&self, v: &[f32]) -> bool {
        !v.is_empty() && v.len() == self.dims() && v.iter().all(|x| x.is_finite())
    }
}

/// A vector of `dims` zeros.
pub fn zero_vector(dims: usize) -> Vec<f32> {
    vec![0.0; dims]
}

/// Pack a vector into the store's BLOB layout: `dims` little-endian
/// `f32`s, 4 bytes each.
///
/// ```rust
/// use studydigest_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), Some(v));
/// ```
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Unpack a BLOB written by [`vec_to_blob`].
///
/// Returns `None` when the length is not a multiple of 4; a truncated
/// vector is never decoded partially.
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// Cosine similarity of two vectors from the same model.
///
/// Vectors of different lengths come from different models and score
/// `0.0`, as do empty vectors and degraded (all-zero) vectors. Sums are
/// accumulated in `f64` and the result is clamped to `[-1.0, 1.0]`, so
/// rounding never pushes a near-duplicate above `1.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold((0.0f64, 0.0f64, 0.0f64), |acc, (&x, &y)| {
        let (x, y) = (f64::from(x), f64::from(y));
        (acc.0 + x * y, acc.1 + x * x, acc.2 + y * y)
    });
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeEmbedding;

    #[test]
    fn test_truncated_blob_is_rejected() {
        let mut blob = vec_to_blob(&[0.25, -1.0]);
        assert_eq!(blob_to_vec(&blob), Some(vec![0.25, -1.0]));
        blob.pop();
        assert_eq!(blob_to_vec(&blob), None);
        assert_eq!(blob_to_vec(&[]), Some(Vec::new()));
    }

    #[test]
    fn test_cosine_never_exceeds_one() {
        let v: Vec<f32> = (0..1536).map(|i| ((i % 7) as f32 + 0.1) * 0.37).collect();
        let score = cosine_similarity(&v, &v);
        assert!(score <= 1.0);
        assert!(score > 0.9999);
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!(cosine_similarity(&v, &neg) >= -1.0);
    }

    #[test]
    fn test_cosine_scale_invariant() {
        let a = vec![3.0, 4.0];
        let b = vec![300.0, 400.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &[4.0, -3.0])).abs() < 1e-6);
    }

    #[test]
    fn test_degraded_vector_scores_zero() {
        let query = vec![0.2, 0.9, -0.4];
        assert_eq!(cosine_similarity(&query, &zero_vector(3)), 0.0);
        assert_eq!(cosine_similarity(&zero_vector(3), &zero_vector(3)), 0.0);
    }

    #[test]
    fn test_vectors_from_another_model_score_zero() {
        // same leading components, different dimension
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn test_embed_batch_single_round_trip() {
        let fake = Arc::new(FakeEmbedding::new(&["alpha", "beta"]));
        let embedder = Embedder::new(fake.clone());
        let texts = vec!["alpha one".to_string(), "beta two".to_string(), "gamma".to_string()];
        let vectors = embedder.embed_batch(&texts).await;
        assert_eq!(vectors.len(), 3);
        assert_eq!(fake.calls(), 1);
        assert!(vectors.iter().all(|v| v.len() == 2));
    }

    #[tokio::test]
    async fn test_embed_batch_empty_makes_no_call() {
        let fake = Arc::new(FakeEmbedding::new(&["alpha"]));
        let embedder = Embedder::new(fake.clone());
        assert!(embedder.embed_batch(&[]).await.is_empty());
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_call_degrades_to_zero_vectors() {
        let fake = Arc::new(FakeEmbedding::new(&["alpha", "beta"]).failing());
        let embedder = Embedder::new(fake);
        let vectors = embedder.embed_batch(&["alpha".to_string(), "beta".to_string()]).await;
        assert_eq!(vectors, vec![vec![0.0, 0.0], vec![0.0, 0.0]]);
    }

    #[tokio::test]
    async fn test_batch_size_splits_requests() {
        let fake = Arc::new(FakeEmbedding::new(&["alpha", "beta"]));
        let embedder = Embedder::new(fake.clone()).with_batch_size(2);
        let texts: Vec<String> = ["alpha", "beta", "alpha beta", "beta"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        let vectors = embedder.embed_batch(&texts).await;
        assert_eq!(fake.calls(), 2);
        assert_eq!(vectors[2], vec![1.0, 1.0]);
        assert_eq!(vectors[3], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_failed_sub_batch_keeps_earlier_vectors() {
        let fake = Arc::new(FakeEmbedding::new(&["alpha", "beta"]).failing_on_call(1));
        let embedder = Embedder::new(fake.clone()).with_batch_size(2);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()];
        let vectors = embedder.embed_batch(&texts).await;
        assert_eq!(fake.calls(), 2);
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 0.0]]);
    }

    #[tokio::test]
    async fn test_try_embed_batch_fails_on_any_sub_batch() {
        let fake = Arc::new(FakeEmbedding::new(&["alpha", "beta"]).failing_on_call(1));
        let embedder = Embedder::new(fake).with_batch_size(2);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()];
        let result = embedder.try_embed_batch(&texts).await;
        assert!(matches!(result, Err(EmbeddingError::Service { .. })));
    }

    #[tokio::test]
    async fn test_malformed_entry_becomes_zero_vector() {
        let fake = Arc::new(FakeEmbedding::new(&["alpha", "beta"]).malformed_for("broken"));
        let embedder = Embedder::new(fake);
        let texts = vec!["alpha".to_string(), "broken".to_string(), "beta".to_string()];
        let vectors = embedder.embed_batch(&texts).await;
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 0.0]);
        assert_eq!(vectors[2], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_try_embed_batch_rejects_malformed() {
        let fake = Arc::new(FakeEmbedding::new(&["alpha"]).malformed_for("broken"));
        let embedder = Embedder::new(fake);
        let result = embedder
            .try_embed_batch(&["alpha".to_string(), "broken".to_string()])
            .await;
        assert!(matches!(result, Err(EmbeddingError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_try_embed_batch_propagates_failure() {
        let fake = Arc::new(FakeEmbedding::new(&["alpha"]).failing());
        let embedder = Embedder::new(fake);
        assert!(embedder.try_embed_batch(&["alpha".to_string()]).await.is_err());
    }
}
