//! In-memory [`FragmentStore`] for tests and embedding the pipeline
//! without a database.
//!
//! Fragments live in a `Vec` behind `std::sync::RwLock`. Queries are a
//! linear scan filtered by scope.

use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Scope, StoredFragment};

use super::FragmentStore;

struct Entry {
    owner_id: String,
    fragment: StoredFragment,
}

impl Entry {
    fn in_scope(&self, scope: &Scope) -> bool {
        match scope {
            Scope::Document { owner_id, document_id } => {
                self.owner_id == *owner_id && self.fragment.chunk.document_id == *document_id
            }
            Scope::Owner(id) => self.owner_id == *id,
        }
    }
}

pub struct InMemoryFragmentStore {
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryFragmentStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Add one fragment owned by `owner_id`.
    pub fn insert(&self, owner_id: &str, chunk: Chunk, vector: Vec<f32>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push(Entry {
            owner_id: owner_id.to_string(),
            fragment: StoredFragment { chunk, vector },
        });
    }

    /// Replace every fragment `owner_id` holds for `document_id` with
    /// `fragments`. Another owner's fragments under the same ID are kept.
    pub fn replace_document(
        &self,
        owner_id: &str,
        document_id: &str,
        fragments: Vec<(Chunk, Vec<f32>)>,
    ) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|e| !(e.owner_id == owner_id && e.fragment.chunk.document_id == document_id));
        entries.extend(fragments.into_iter().map(|(chunk, vector)| Entry {
            owner_id: owner_id.to_string(),
            fragment: StoredFragment { chunk, vector },
        }));
    }

    /// Number of stored fragments across all owners and documents.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when no fragment is stored at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryFragmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FragmentStore for InMemoryFragmentStore {
    async fn query(&self, scope: &Scope) -> Result<Vec<StoredFragment>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<StoredFragment> = entries
            .iter()
            .filter(|e| e.in_scope(scope))
            .map(|e| e.fragment.clone())
            .collect();
        found.sort_by(|a, b| {
            a.chunk
                .document_id
                .cmp(&b.chunk.document_id)
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        Ok(found)
    }
}
