//! Fragment ingestion: text → normalize → fragments → embed → SQLite.
//!
//! Fragments whose hash already has a vector from the configured model are
//! not re-embedded. Embedding failures abort the ingest: a zero vector in
//! the store would never be retrieved.

use anyhow::{bail, Context, Result};
use std::path::Path;

use tracing::info;

use studydigest_core::chunk::RecursiveChunker;
use studydigest_core::embedding::Embedder;
use studydigest_core::models::Document;
use studydigest_core::normalize::TextNormalizer;
use studydigest_core::tokens::TokenEstimator;

use crate::config::Config;
use crate::sqlite_store::SqliteFragmentStore;
use crate::{db, embedding, input};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub fragments: usize,
    pub embedded: usize,
    pub reused: usize,
}

pub async fn run_ingest(
    config: &Config,
    path: &Path,
    owner_id: &str,
    document_id: Option<String>,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let text = input::read_text(path)?;
    let document_id = document_id.unwrap_or_else(|| input::default_document_id(owner_id, path));
    let mut document = Document::new(owner_id, text).with_id(&document_id);
    if path.as_os_str() != "-" {
        document = document.with_source_file(path.display().to_string());
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let pool = db::connect(config).await?;
    let store = SqliteFragmentStore::new(pool, embedder.model_name(), embedder.dims());

    let stats = ingest_document(config, &store, &embedder, &document).await?;

    println!("ingest {}", path.display());
    println!("  document:  {}", document.id);
    println!("  owner:     {}", document.owner_id);
    println!("  fragments: {}", stats.fragments);
    println!("  embedded:  {}", stats.embedded);
    println!("  reused:    {}", stats.reused);

    store.pool().close().await;
    Ok(())
}

/// Split, embed and store `document`, replacing its previous fragments.
pub async fn ingest_document(
    config: &Config,
    store: &SqliteFragmentStore,
    embedder: &Embedder,
    document: &Document,
) -> Result<IngestStats> {
    let normalized = TextNormalizer::new(config.normalize.max_chars).normalize(&document.text);
    if normalized.is_empty() {
        bail!("Document {} is empty after normalization", document.id);
    }

    let estimator = TokenEstimator::new(config.normalize.chars_per_token)?;
    let chunker = RecursiveChunker::new(
        config.retrieval.fragment_chars,
        config.retrieval.fragment_overlap,
    )?
    .with_estimator(estimator);
    let fragments = chunker.chunk(&document.id, &normalized);

    let existing = store.existing_vectors(&document.id).await?;
    let pending: Vec<String> = fragments
        .iter()
        .filter(|f| !existing.contains_key(&f.hash))
        .map(|f| f.text.clone())
        .collect();

    let fresh = embedder
        .try_embed_batch(&pending)
        .await
        .with_context(|| format!("Failed to embed fragments of {}", document.id))?;

    let mut fresh = fresh.into_iter();
    let mut vectors = Vec::with_capacity(fragments.len());
    for fragment in &fragments {
        let vector = match existing.get(&fragment.hash) {
            Some(v) => v.clone(),
            None => fresh
                .next()
                .context("embedding service returned too few vectors")?,
        };
        vectors.push(vector);
    }

    store.replace_fragments(document, &fragments, &vectors).await?;

    let stats = IngestStats {
        fragments: fragments.len(),
        embedded: pending.len(),
        reused: fragments.len() - pending.len(),
    };
    info!(
        document_id = %document.id,
        fragments = stats.fragments,
        embedded = stats.embedded,
        reused = stats.reused,
        "document ingested"
    );
    Ok(stats)
}
