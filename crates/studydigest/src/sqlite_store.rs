//! SQLite-backed [`FragmentStore`].
//!
//! Vectors are stored per fragment together with the embedding model name
//! and dimension count. Queries only return vectors produced by the
//! configured model with the configured dimensions, so switching models
//! never mixes incompatible vectors in one ranking.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use studydigest_core::embedding::{blob_to_vec, vec_to_blob};
use studydigest_core::models::{Chunk, Document, Scope, StoredFragment};
use studydigest_core::store::FragmentStore;

pub struct SqliteFragmentStore {
    pool: SqlitePool,
    model: String,
    dims: usize,
}

impl SqliteFragmentStore {
    pub fn new(pool: SqlitePool, model: impl Into<String>, dims: usize) -> Self {
        Self {
            pool,
            model: model.into(),
            dims,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Vectors already stored for `document_id` by the current model,
    /// keyed by fragment hash.
    pub async fn existing_vectors(&self, document_id: &str) -> Result<HashMap<String, Vec<f32>>> {
        let rows = sqlx::query(
            r#"
            SELECT v.hash, v.embedding
            FROM fragment_vectors v
            JOIN fragments f ON f.id = v.fragment_id
            WHERE f.document_id = ? AND v.model = ? AND v.dims = ?
            "#,
        )
        .bind(document_id)
        .bind(&self.model)
        .bind(self.dims as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = HashMap::new();
        for row in rows {
            let hash: String = row.get("hash");
            let blob: Vec<u8> = row.get("embedding");
            // an undecodable vector is simply re-embedded
            if let Some(vector) = blob_to_vec(&blob) {
                out.insert(hash, vector);
            }
        }
        Ok(out)
    }

    /// Replace every fragment of `document` in one transaction.
    ///
    /// `vectors` must line up with `chunks` and have the store's dimension.
    pub async fn replace_fragments(
        &self,
        document: &Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "{} fragments but {} vectors for document {}",
                chunks.len(),
                vectors.len(),
                document.id
            );
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dims) {
            bail!(
                "vector has {} dimensions, store expects {}",
                v.len(),
                self.dims
            );
        }

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let current_owner: Option<String> =
            sqlx::query_scalar("SELECT owner_id FROM documents WHERE id = ?")
                .bind(&document.id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(owner) = current_owner.filter(|o| *o != document.owner_id) {
            bail!("document {} belongs to owner {}", document.id, owner);
        }

        sqlx::query(
            r#"
            INSERT INTO documents (id, owner_id, source_file_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_file_id = excluded.source_file_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&document.id)
        .bind(&document.owner_id)
        .bind(&document.source_file_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM fragment_vectors WHERE fragment_id IN (SELECT id FROM fragments WHERE document_id = ?)",
        )
        .bind(&document.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM fragments WHERE document_id = ?")
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO fragments (id, document_id, owner_id, chunk_index, text, hash, token_estimate)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&document.id)
            .bind(&document.owner_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(chunk.token_estimate as i64)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO fragment_vectors (fragment_id, model, dims, hash, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&self.model)
            .bind(self.dims as i64)
            .bind(&chunk.hash)
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(document_id = %document.id, fragments = chunks.len(), "fragments replaced");
        Ok(())
    }

    pub async fn fragment_count(&self, scope: &Scope) -> Result<i64> {
        let (clause, values) = scope_filter(scope);
        let sql = format!("SELECT COUNT(*) FROM fragments f WHERE {}", clause);
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for value in values {
            query = query.bind(value);
        }
        let count: i64 = query.fetch_one(&self.pool).await?;
        Ok(count)
    }
}

/// `WHERE` clause over `fragments f` plus its bind values, in order.
fn scope_filter(scope: &Scope) -> (&'static str, Vec<&str>) {
    match scope {
        Scope::Document { owner_id, document_id } => (
            "f.owner_id = ? AND f.document_id = ?",
            vec![owner_id.as_str(), document_id.as_str()],
        ),
        Scope::Owner(id) => ("f.owner_id = ?", vec![id.as_str()]),
    }
}

#[async_trait]
impl FragmentStore for SqliteFragmentStore {
    async fn query(&self, scope: &Scope) -> Result<Vec<StoredFragment>> {
        let (clause, values) = scope_filter(scope);
        let sql = format!(
            r#"
            SELECT f.id, f.document_id, f.chunk_index, f.text, f.hash, f.token_estimate, v.embedding
            FROM fragments f
            JOIN fragment_vectors v ON v.fragment_id = f.id
            WHERE {} AND v.model = ? AND v.dims = ?
            ORDER BY f.document_id, f.chunk_index
            "#,
            clause
        );
        let mut query = sqlx::query(&sql);
        for value in values {
            query = query.bind(value);
        }
        let rows = query
            .bind(&self.model)
            .bind(self.dims as i64)
            .fetch_all(&self.pool)
            .await?;

        let fragments = rows
            .iter()
            .filter_map(|row| {
                let id: String = row.get("id");
                let blob: Vec<u8> = row.get("embedding");
                let Some(vector) = blob_to_vec(&blob) else {
                    warn!(fragment_id = %id, bytes = blob.len(), "skipping fragment with corrupt vector");
                    return None;
                };
                let token_estimate: i64 = row.get("token_estimate");
                Some(StoredFragment {
                    chunk: Chunk {
                        id,
                        document_id: row.get("document_id"),
                        chunk_index: row.get("chunk_index"),
                        text: row.get("text"),
                        token_estimate: token_estimate.max(0) as usize,
                        hash: row.get("hash"),
                        paragraph_indices: Vec::new(),
                    },
                    vector,
                })
            })
            .collect::<Vec<_>>();

        debug!(scope = %scope.label(), fragments = fragments.len(), "fragment query");
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};
    use studydigest_core::chunk::RecursiveChunker;

    async fn open(dir: &tempfile::TempDir) -> SqlitePool {
        let config = Config {
            db: DbConfig {
                path: dir.path().join("digest.sqlite"),
            },
            normalize: Default::default(),
            summarize: Default::default(),
            retrieval: Default::default(),
            embedding: Default::default(),
            generation: Default::default(),
            chat: Default::default(),
        };
        let pool = crate::db::connect(&config).await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        pool
    }

    fn fragments(doc: &Document) -> Vec<Chunk> {
        RecursiveChunker::new(40, 0).unwrap().chunk(&doc.id, &doc.text)
    }

    #[tokio::test]
    async fn test_replace_and_query_by_scope() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteFragmentStore::new(open(&dir).await, "m", 2);

        let doc = Document::new("alice", "first fragment of text here. second fragment follows on.")
            .with_id("d1");
        let chunks = fragments(&doc);
        let vectors = vec![vec![1.0, 0.0]; chunks.len()];
        store.replace_fragments(&doc, &chunks, &vectors).await.unwrap();

        let by_owner = store.query(&Scope::Owner("alice".into())).await.unwrap();
        assert_eq!(by_owner.len(), chunks.len());
        assert_eq!(by_owner[0].vector, vec![1.0, 0.0]);
        assert!(store.query(&Scope::Owner("bob".into())).await.unwrap().is_empty());
        assert_eq!(
            store.query(&Scope::document("alice", "d1")).await.unwrap().len(),
            chunks.len()
        );

        // re-ingest replaces instead of appending
        store.replace_fragments(&doc, &chunks, &vectors).await.unwrap();
        assert_eq!(
            store.fragment_count(&Scope::document("alice", "d1")).await.unwrap(),
            chunks.len() as i64
        );
    }

    #[tokio::test]
    async fn test_document_scope_requires_matching_owner() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteFragmentStore::new(open(&dir).await, "m", 2);
        let doc = Document::new("alice", "private notes about alice").with_id("alice/short");
        let chunks = fragments(&doc);
        let vectors = vec![vec![1.0, 0.0]; chunks.len()];
        store.replace_fragments(&doc, &chunks, &vectors).await.unwrap();

        let foreign = Scope::document("bob", "alice/short");
        assert!(store.query(&foreign).await.unwrap().is_empty());
        assert_eq!(store.fragment_count(&foreign).await.unwrap(), 0);
        assert_eq!(
            store.query(&Scope::document("alice", "alice/short")).await.unwrap().len(),
            chunks.len()
        );
    }

    #[tokio::test]
    async fn test_cannot_replace_another_owners_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteFragmentStore::new(open(&dir).await, "m", 2);
        let doc = Document::new("alice", "alice wrote this").with_id("shared");
        let chunks = fragments(&doc);
        store
            .replace_fragments(&doc, &chunks, &vec![vec![1.0, 0.0]; chunks.len()])
            .await
            .unwrap();

        let takeover = Document::new("bob", "bob wrote this").with_id("shared");
        let chunks = fragments(&takeover);
        let err = store
            .replace_fragments(&takeover, &chunks, &vec![vec![0.0, 1.0]; chunks.len()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("belongs to owner alice"));
        assert_eq!(store.fragment_count(&Scope::owner("alice")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_other_model_vectors_are_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(&dir).await;
        let old = SqliteFragmentStore::new(pool.clone(), "old-model", 2);
        let doc = Document::new("alice", "some short note").with_id("d1");
        let chunks = fragments(&doc);
        let vectors = vec![vec![0.5, 0.5]; chunks.len()];
        old.replace_fragments(&doc, &chunks, &vectors).await.unwrap();

        let new = SqliteFragmentStore::new(pool, "new-model", 3);
        assert!(new.query(&Scope::Owner("alice".into())).await.unwrap().is_empty());
        assert!(new.existing_vectors("d1").await.unwrap().is_empty());
        assert_eq!(old.existing_vectors("d1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteFragmentStore::new(open(&dir).await, "m", 3);
        let doc = Document::new("alice", "note").with_id("d1");
        let chunks = fragments(&doc);
        let err = store
            .replace_fragments(&doc, &chunks, &[vec![1.0, 2.0]])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimensions"));
    }
}
