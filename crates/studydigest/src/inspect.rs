use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use studydigest_core::embedding::Embedder;
use studydigest_core::summarize::Summarizer;

use crate::config::Config;
use crate::embedding::DisabledEmbedding;
use crate::generation::DisabledGeneration;
use crate::input;

/// Print the size analysis of a document. Makes no service calls.
pub fn run_inspect(config: &Config, path: &Path) -> Result<()> {
    let text = input::read_text(path)?;
    let summarizer = Summarizer::new(
        Arc::new(DisabledGeneration),
        Embedder::new(Arc::new(DisabledEmbedding::new(0))),
        config.summarizer_config(),
    )?;
    let report = summarizer.inspect(&text);

    println!("inspect {}", path.display());
    println!("  raw chars:        {}", report.raw_chars);
    println!("  normalized chars: {}", report.normalized_chars);
    println!("  truncated:        {}", report.truncated);
    println!("  estimated tokens: {}", report.estimated_tokens);
    println!("  strategy:         {}", report.mode);
    println!("  recursive chunks: {}", report.recursive_chunks);
    println!("  paragraphs:       {}", report.paragraphs);
    Ok(())
}
