use anyhow::{bail, Result};
use std::path::Path;

use tracing::{info, warn};

use studydigest_core::models::Document;
use studydigest_core::summarize::Summarizer;

use crate::config::Config;
use crate::{embedding, generation, input};

/// Summarize a document and print the result.
///
/// Pipeline failures are printed as a diagnostic (prompt size included)
/// and turned into a non-zero exit.
pub async fn run_summarize(config: &Config, path: &Path, owner_id: &str, json: bool) -> Result<()> {
    if !config.generation.is_enabled() {
        bail!("Generation provider is disabled. Set [generation] provider in config.");
    }
    if !config.embedding.is_enabled() {
        warn!("embedding provider is disabled, semantic chunking will not merge paragraphs");
    }

    let text = input::read_text(path)?;
    let generator = generation::create_client(&config.generation)?;
    let embedder = embedding::create_embedder(&config.embedding)?;
    let summarizer = Summarizer::new(generator, embedder, config.summarizer_config())?;

    let mut document = Document::new(owner_id, text);
    if path.as_os_str() != "-" {
        document = document.with_source_file(path.display().to_string());
    }

    let result = match summarizer.summarize(&document).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}", e.diagnostic());
            bail!("summarization failed");
        }
    };
    info!(document_id = %document.id, mode = %result.mode, "summary produced");

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("--- Summary ({}) ---", result.mode);
    println!("{}", result.text);
    println!();
    if let Some(keywords) = &result.keywords {
        println!("keywords: {}", keywords.join(", "));
    }
    if let Some(message) = &result.message {
        println!("note:     {}", message);
    }
    Ok(())
}
