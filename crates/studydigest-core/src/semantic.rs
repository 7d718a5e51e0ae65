//! Embedding-similarity paragraph grouping.
//!
//! # Algorithm
//!
//! 1. Split the text into paragraphs ([`ParagraphSplitter`]).
//! 2. Embed every paragraph in one batched call.
//! 3. Walk paragraphs in order. Paragraph `i` joins the open chunk when
//!    `cos(v[i-1], v[i]) ≥ threshold` and the chunk stays within
//!    `max_chunk_chars`; otherwise the chunk is closed and `i` opens the
//!    next one.
//!
//! A paragraph whose embedding degraded to a zero vector scores `0.0`
//! against its neighbours and therefore always starts a new chunk.

use tracing::debug;

use crate::chunk::make_chunk;
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::SummarizeError;
use crate::models::Chunk;
use crate::paragraph::ParagraphSplitter;
use crate::tokens::TokenEstimator;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.75;
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 5000;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct SemanticChunker {
    embedder: Embedder,
    splitter: ParagraphSplitter,
    threshold: f32,
    max_chunk_chars: usize,
    estimator: TokenEstimator,
}

impl SemanticChunker {
    /// Chunker with the default splitter, threshold and chunk size.
    pub fn new(embedder: Embedder) -> Self {
        Self {
            embedder,
            splitter: ParagraphSplitter::default(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            estimator: TokenEstimator::default(),
        }
    }

    /// Use `splitter` to cut the text into paragraphs.
    pub fn with_splitter(mut self, splitter: ParagraphSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    /// Minimum cosine similarity for a paragraph to join the previous
    /// group.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Upper bound on a merged chunk's length in characters.
    pub fn with_max_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars;
        self
    }

    /// Estimator used for each chunk's `token_estimate`.
    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn splitter(&self) -> &ParagraphSplitter {
        &self.splitter
    }

    /// Group the paragraphs of `text` into topically coherent chunks.
    ///
    /// # Errors
    ///
    /// [`SummarizeError::ChunkingDegeneracy`] when no paragraph survives
    /// the splitter's size floor.
    pub async fn chunk(&self, document_id: &str, text: &str) -> Result<Vec<Chunk>, SummarizeError> {
        let paragraphs = self.splitter.split(text);
        if paragraphs.is_empty() {
            return Err(SummarizeError::ChunkingDegeneracy);
        }

        let vectors = self.embedder.embed_batch(&paragraphs).await;
        let groups = group_paragraphs(&paragraphs, &vectors, self.threshold, self.max_chunk_chars);

        debug!(
            paragraphs = paragraphs.len(),
            chunks = groups.len(),
            threshold = self.threshold,
            "semantic grouping done"
        );

        Ok(groups
            .into_iter()
            .enumerate()
            .map(|(i, indices)| {
                let text = indices
                    .iter()
                    .map(|&p| paragraphs[p].as_str())
                    .collect::<Vec<_>>()
                    .join(PARAGRAPH_SEPARATOR);
                let mut chunk = make_chunk(document_id, i as i64, &text, &self.estimator);
                chunk.paragraph_indices = indices;
                chunk
            })
            .collect())
    }
}

/// Greedy adjacent-paragraph grouping; returns paragraph indices per group.
pub fn group_paragraphs(
    paragraphs: &[String],
    vectors: &[Vec<f32>],
    threshold: f32,
    max_chunk_chars: usize,
) -> Vec<Vec<usize>> {
    if paragraphs.is_empty() {
        return Vec::new();
    }

    let sep_len = PARAGRAPH_SEPARATOR.len();
    let mut groups: Vec<Vec<usize>> = vec![vec![0]];
    let mut current_len = paragraphs[0].chars().count();

    for i in 1..paragraphs.len() {
        let len = paragraphs[i].chars().count();
        let similarity = match (vectors.get(i - 1), vectors.get(i)) {
            (Some(prev), Some(cur)) => cosine_similarity(prev, cur),
            _ => 0.0,
        };
        let fits = current_len + sep_len + len <= max_chunk_chars;

        match groups.last_mut() {
            Some(group) if similarity >= threshold && fits => {
                group.push(i);
                current_len += sep_len + len;
            }
            _ => {
                groups.push(vec![i]);
                current_len = len;
            }
        }
    }

    groups
}
