//! Core data models shared by the summarization and retrieval pipelines.
//!
//! Everything here is created per request and dropped afterwards. Long-term
//! storage of fragments and vectors belongs to a [`FragmentStore`](crate::store::FragmentStore)
//! implementation, and conversation turns are owned by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A plain-text document submitted for summarization or ingestion.
///
/// Immutable once constructed; all derived text (normalized body, chunks)
/// is produced as new values.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub text: String,
    pub source_file_id: Option<String>,
}

impl Document {
    /// Create a document with a fresh UUID.
    pub fn new(owner_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            text: text.into(),
            source_file_id: None,
        }
    }

    /// Override the generated ID (e.g. when re-ingesting a known note).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_source_file(mut self, source_file_id: impl Into<String>) -> Self {
        self.source_file_id = Some(source_file_id.into());
        self
    }
}

/// A contiguous span of a document treated as one unit.
///
/// `paragraph_indices` is only populated by the semantic chunker and lists
/// the paragraphs (in splitter order) merged into this chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub token_estimate: usize,
    /// SHA-256 of `text`, used to skip re-embedding unchanged fragments.
    pub hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paragraph_indices: Vec<usize>,
}

/// Restricts which stored fragments a retrieval may see.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Fragments of a single document, and only if `owner_id` owns them.
    Document { owner_id: String, document_id: String },
    /// All fragments owned by a user.
    Owner(String),
}

impl Scope {
    pub fn document(owner_id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Scope::Document {
            owner_id: owner_id.into(),
            document_id: document_id.into(),
        }
    }

    pub fn owner(owner_id: impl Into<String>) -> Self {
        Scope::Owner(owner_id.into())
    }

    /// The owner every fragment in scope must belong to.
    pub fn owner_id(&self) -> &str {
        match self {
            Scope::Document { owner_id, .. } | Scope::Owner(owner_id) => owner_id,
        }
    }

    /// Short form for log fields, e.g. `owner:alice` or `document:notes@alice`.
    pub fn label(&self) -> String {
        match self {
            Scope::Document { owner_id, document_id } => {
                format!("document:{}@{}", document_id, owner_id)
            }
            Scope::Owner(id) => format!("owner:{}", id),
        }
    }
}

/// A fragment as returned by the vector store: text plus its vector.
#[derive(Debug, Clone)]
pub struct StoredFragment {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A fragment ranked by the retrieval pipeline.
///
/// `score` is the first-stage cosine similarity; `rerank_score` is filled
/// in by the [`ReRanker`](crate::rerank::ReRanker).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalCandidate {
    pub chunk: Chunk,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl RetrievalCandidate {
    /// The most refined score available.
    pub fn effective_score(&self) -> f32 {
        self.rerank_score.unwrap_or(self.score)
    }
}

/// Decomposition strategy used to produce a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    Simple,
    Recursive,
    Semantic,
}

impl SummaryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryMode::Simple => "simple",
            SummaryMode::Recursive => "recursive",
            SummaryMode::Semantic => "semantic",
        }
    }
}

impl std::fmt::Display for SummaryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final output of the summarization pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryResult {
    pub mode: SummaryMode,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One question/answer exchange, consulted read-only as recent history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}
