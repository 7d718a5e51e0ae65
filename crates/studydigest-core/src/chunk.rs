//! Fixed-size overlapping window chunker.
//!
//! Splits normalized text into windows of `chunk_size` characters. Window
//! `i` starts at `i × (chunk_size − overlap)`, so adjacent windows share
//! exactly `overlap` characters and a sentence straddling a boundary
//! appears whole in at least one of them. The final window is truncated to
//! the remaining text.
//!
//! Sizes are measured in Unicode scalar values, not bytes, so CJK text is
//! windowed the same way as ASCII.
//!
//! # Example
//!
//! ```rust
//! use studydigest_core::chunk::RecursiveChunker;
//!
//! let chunker = RecursiveChunker::new(10, 4).unwrap();
//! let chunks = chunker.chunk("doc-1", "abcdefghijklmnop");
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(chunks[0].text, "abcdefghij");
//! assert_eq!(chunks[1].text, "ghijklmnop");
//! assert_eq!(chunks[2].text, "mnop");
//! ```
//!
//! Each chunk gets a fresh UUID, a SHA-256 hash of its text and a token
//! estimate.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::models::Chunk;
use crate::tokens::TokenEstimator;

pub const DEFAULT_CHUNK_SIZE: usize = 4000;
pub const DEFAULT_OVERLAP: usize = 500;

/// Overlapping fixed-window splitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecursiveChunker {
    chunk_size: usize,
    overlap: usize,
    estimator: TokenEstimator,
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            estimator: TokenEstimator::default(),
        }
    }
}

impl RecursiveChunker {
    /// # Errors
    ///
    /// `chunk_size` must be positive and `overlap` strictly smaller than it,
    /// otherwise windows would never advance.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError("chunk_size must be > 0".to_string()));
        }
        if overlap >= chunk_size {
            return Err(ConfigError(format!(
                "overlap ({}) must be less than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
            estimator: TokenEstimator::default(),
        })
    }

    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into overlapping windows. Empty text yields no chunks.
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::with_capacity(self.window_count(chars.len()));
        let mut start = 0usize;
        let mut index: i64 = 0;

        loop {
            let end = (start + self.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            chunks.push(make_chunk(document_id, index, &window, &self.estimator));
            if end == chars.len() {
                break;
            }
            start += step;
            index += 1;
        }

        chunks
    }

    /// Number of windows [`chunk`](Self::chunk) produces for a text of
    /// `chars` characters.
    pub fn window_count(&self, chars: usize) -> usize {
        if chars == 0 {
            return 0;
        }
        if chars <= self.chunk_size {
            return 1;
        }
        let step = self.chunk_size - self.overlap;
        1 + (chars - self.chunk_size).div_ceil(step)
    }
}

/// Create a [`Chunk`] with a UUID, SHA-256 content hash and token estimate.
pub(crate) fn make_chunk(
    document_id: &str,
    index: i64,
    text: &str,
    estimator: &TokenEstimator,
) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        token_estimate: estimator.estimate(text),
        hash: content_hash(text),
        paragraph_indices: Vec::new(),
    }
}

/// Hex SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
