//! Summarization orchestrator.
//!
//! Normalizes the document, picks a strategy from its estimated size and
//! runs it:
//!
//! - **simple**: one generation call over the whole text. A generation
//!   failure here escalates to the recursive strategy once.
//! - **recursive**: fixed overlapping windows, one short summary per
//!   window, then hierarchical reduction.
//! - **semantic**: embedding-grouped paragraphs, one summary per group,
//!   then hierarchical reduction. When no paragraph survives splitting the
//!   text is chunked recursively instead.
//!
//! Recursive and semantic failures are returned to the caller; there is no
//! second fallback. Keyword extraction runs after a successful summary and
//! never fails it.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chunk::RecursiveChunker;
use crate::embedding::Embedder;
use crate::error::{ConfigError, SummarizeError};
use crate::generation::{GenerationClient, GenerationRequest};
use crate::models::{Chunk, Document, SummaryMode, SummaryResult};
use crate::normalize::{TextNormalizer, TRUNCATION_MARKER};
use crate::paragraph::ParagraphSplitter;
use crate::reduce::{HierarchicalReducer, ReducerConfig};
use crate::semantic::SemanticChunker;
use crate::strategy::StrategySelector;
use crate::tokens::TokenEstimator;

pub const SIMPLE_INSTRUCTION: &str = "You summarize study material. Write a concise, well-structured \
summary of the document that covers its main ideas, key definitions and conclusions. Answer in the \
language of the document.";

pub const CHUNK_INSTRUCTION: &str = "You summarize one section of a longer document. List the key \
points of this section briefly and faithfully; do not add information that is not in the text. \
Answer in the language of the section.";

pub const KEYWORD_INSTRUCTION: &str = "Extract up to 8 keywords or key phrases from the summary. \
Reply with a single line of comma-separated keywords and nothing else.";

/// Tunables for [`Summarizer`]. Defaults carry the standard thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizerConfig {
    pub max_input_chars: usize,
    pub chars_per_token: f64,
    pub simple_max_tokens: usize,
    pub semantic_min_tokens: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_paragraph_chars: usize,
    pub max_paragraph_chars: usize,
    pub target_paragraph_chars: usize,
    pub similarity_threshold: f32,
    pub max_semantic_chunk_chars: usize,
    pub simple_summary_tokens: usize,
    pub recursive_chunk_tokens: usize,
    pub semantic_chunk_tokens: usize,
    pub final_summary_tokens: usize,
    pub intermediate_summary_tokens: usize,
    pub group_size: usize,
    pub temperature: f32,
    pub extract_keywords: bool,
    pub keyword_tokens: usize,
    pub max_keywords: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_input_chars: crate::normalize::DEFAULT_MAX_CHARS,
            chars_per_token: crate::tokens::DEFAULT_CHARS_PER_TOKEN,
            simple_max_tokens: crate::strategy::DEFAULT_SIMPLE_MAX_TOKENS,
            semantic_min_tokens: crate::strategy::DEFAULT_SEMANTIC_MIN_TOKENS,
            chunk_size: crate::chunk::DEFAULT_CHUNK_SIZE,
            chunk_overlap: crate::chunk::DEFAULT_OVERLAP,
            min_paragraph_chars: crate::paragraph::DEFAULT_MIN_PARAGRAPH_CHARS,
            max_paragraph_chars: crate::paragraph::DEFAULT_MAX_PARAGRAPH_CHARS,
            target_paragraph_chars: crate::paragraph::DEFAULT_TARGET_PARAGRAPH_CHARS,
            similarity_threshold: crate::semantic::DEFAULT_SIMILARITY_THRESHOLD,
            max_semantic_chunk_chars: crate::semantic::DEFAULT_MAX_CHUNK_CHARS,
            simple_summary_tokens: 2000,
            recursive_chunk_tokens: 600,
            semantic_chunk_tokens: 800,
            final_summary_tokens: crate::reduce::DEFAULT_FINAL_MAX_TOKENS,
            intermediate_summary_tokens: crate::reduce::DEFAULT_INTERMEDIATE_MAX_TOKENS,
            group_size: crate::reduce::DEFAULT_GROUP_SIZE,
            temperature: 0.3,
            extract_keywords: true,
            keyword_tokens: 200,
            max_keywords: 8,
        }
    }
}

/// Offline size analysis of a document, without any service calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    pub raw_chars: usize,
    pub normalized_chars: usize,
    pub truncated: bool,
    pub estimated_tokens: usize,
    pub mode: SummaryMode,
    pub recursive_chunks: usize,
    pub paragraphs: usize,
}

pub struct Summarizer {
    generator: Arc<dyn GenerationClient>,
    normalizer: TextNormalizer,
    estimator: TokenEstimator,
    selector: StrategySelector,
    recursive: RecursiveChunker,
    semantic: SemanticChunker,
    reducer: HierarchicalReducer,
    config: SummarizerConfig,
}

impl Summarizer {
    /// Build all stages from `config`.
    ///
    /// # Errors
    ///
    /// Any stage rejecting its parameters.
    pub fn new(
        generator: Arc<dyn GenerationClient>,
        embedder: Embedder,
        config: SummarizerConfig,
    ) -> Result<Self, ConfigError> {
        let estimator = TokenEstimator::new(config.chars_per_token)?;
        let selector =
            StrategySelector::new(config.simple_max_tokens, config.semantic_min_tokens, estimator)?;
        let recursive =
            RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?.with_estimator(estimator);
        let splitter = ParagraphSplitter::new(
            config.min_paragraph_chars,
            config.max_paragraph_chars,
            config.target_paragraph_chars,
        )?;
        let semantic = SemanticChunker::new(embedder)
            .with_splitter(splitter)
            .with_threshold(config.similarity_threshold)
            .with_max_chunk_chars(config.max_semantic_chunk_chars)
            .with_estimator(estimator);
        let reducer = HierarchicalReducer::new(
            generator.clone(),
            ReducerConfig {
                group_size: config.group_size,
                final_max_tokens: config.final_summary_tokens,
                intermediate_max_tokens: config.intermediate_summary_tokens,
                temperature: config.temperature,
            },
        )?
        .with_estimator(estimator);

        Ok(Self {
            generator,
            normalizer: TextNormalizer::new(config.max_input_chars),
            estimator,
            selector,
            recursive,
            semantic,
            reducer,
            config,
        })
    }

    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    /// Size analysis used by `inspect`: no embedding or generation calls.
    pub fn inspect(&self, raw: &str) -> Inspection {
        let normalized = self.normalizer.normalize(raw);
        let normalized_chars = normalized.chars().count();
        let estimated_tokens = self.estimator.for_chars(normalized_chars);
        Inspection {
            raw_chars: raw.chars().count(),
            normalized_chars,
            truncated: normalized.ends_with(TRUNCATION_MARKER),
            estimated_tokens,
            mode: self.selector.select_for_tokens(estimated_tokens),
            recursive_chunks: self.recursive.window_count(normalized_chars),
            paragraphs: self.semantic.splitter().split(&normalized).len(),
        }
    }

    /// Summarize a document end to end.
    ///
    /// # Errors
    ///
    /// [`SummarizeError::EmptyDocument`] for text that normalizes to
    /// nothing, otherwise the failure of the strategy that ran last.
    pub async fn summarize(&self, document: &Document) -> Result<SummaryResult, SummarizeError> {
        let normalized = self.normalizer.normalize(&document.text);
        if normalized.is_empty() {
            return Err(SummarizeError::EmptyDocument);
        }

        let tokens = self.estimator.estimate(&normalized);
        let mode = self.selector.select_for_tokens(tokens);
        info!(
            document = %document.id,
            chars = normalized.chars().count(),
            tokens,
            mode = %mode,
            "selected summary strategy"
        );

        let mut result = match mode {
            SummaryMode::Simple => match self.summarize_simple(&normalized).await {
                Ok(result) => result,
                Err(err @ SummarizeError::Generation { .. }) => {
                    warn!(error = %err, "simple summary failed, retrying with recursive strategy");
                    let mut result = self.summarize_recursive(&document.id, &normalized).await?;
                    result.message = Some(format!(
                        "simple summary failed; recursive fallback: {}",
                        result.message.unwrap_or_default()
                    ));
                    result
                }
                Err(err) => return Err(err),
            },
            SummaryMode::Recursive => self.summarize_recursive(&document.id, &normalized).await?,
            SummaryMode::Semantic => self.summarize_semantic(&document.id, &normalized).await?,
        };

        if self.config.extract_keywords {
            result.keywords = self.extract_keywords(&result.text).await;
        }
        Ok(result)
    }

    async fn summarize_simple(&self, text: &str) -> Result<SummaryResult, SummarizeError> {
        let summary = self
            .generate(
                SIMPLE_INSTRUCTION,
                text.to_string(),
                self.config.simple_summary_tokens,
                "simple summary",
            )
            .await?;
        Ok(SummaryResult {
            mode: SummaryMode::Simple,
            text: summary,
            keywords: None,
            message: None,
        })
    }

    async fn summarize_recursive(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<SummaryResult, SummarizeError> {
        let chunks = self.recursive.chunk(document_id, text);
        self.summarize_chunks(SummaryMode::Recursive, &chunks, self.config.recursive_chunk_tokens)
            .await
    }

    async fn summarize_semantic(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<SummaryResult, SummarizeError> {
        match self.semantic.chunk(document_id, text).await {
            Ok(chunks) => {
                self.summarize_chunks(SummaryMode::Semantic, &chunks, self.config.semantic_chunk_tokens)
                    .await
            }
            Err(SummarizeError::ChunkingDegeneracy) => {
                warn!(document = %document_id, "no paragraphs survived splitting, chunking recursively");
                let mut result = self.summarize_recursive(document_id, text).await?;
                result.message = Some(format!(
                    "no usable paragraphs; recursive fallback: {}",
                    result.message.unwrap_or_default()
                ));
                Ok(result)
            }
            Err(err) => Err(err),
        }
    }

    /// Summarize each chunk in order, then reduce the partial summaries.
    async fn summarize_chunks(
        &self,
        mode: SummaryMode,
        chunks: &[Chunk],
        max_tokens: usize,
    ) -> Result<SummaryResult, SummarizeError> {
        let total = chunks.len();
        let mut partials = Vec::with_capacity(total);
        for chunk in chunks {
            let content = format!("Section {} of {}:\n\n{}", chunk.chunk_index + 1, total, chunk.text);
            let partial = self
                .generate(CHUNK_INSTRUCTION, content, max_tokens, "chunk summary")
                .await?;
            debug!(chunk = chunk.chunk_index, chars = partial.chars().count(), "chunk summarized");
            partials.push(partial);
        }

        let reduction = self.reducer.reduce(partials).await?;
        Ok(SummaryResult {
            mode,
            text: reduction.text,
            keywords: None,
            message: Some(format!(
                "{} chunks merged in {} {}",
                total,
                reduction.levels,
                if reduction.levels == 1 { "level" } else { "levels" }
            )),
        })
    }

    async fn extract_keywords(&self, summary: &str) -> Option<Vec<String>> {
        let reply = self
            .generate(
                KEYWORD_INSTRUCTION,
                summary.to_string(),
                self.config.keyword_tokens,
                "keyword extraction",
            )
            .await;
        match reply {
            Ok(text) => {
                let keywords = parse_keywords(&text, self.config.max_keywords);
                if keywords.is_empty() {
                    None
                } else {
                    Some(keywords)
                }
            }
            Err(err) => {
                warn!(error = %err, "keyword extraction failed");
                None
            }
        }
    }

    async fn generate(
        &self,
        instruction: &str,
        content: String,
        max_tokens: usize,
        stage: &'static str,
    ) -> Result<String, SummarizeError> {
        let request =
            GenerationRequest::instruct(instruction, content, max_tokens, self.config.temperature);
        self.generator
            .generate(&request)
            .await
            .map(|text| text.trim().to_string())
            .map_err(|source| SummarizeError::Generation {
                stage,
                prompt_chars: request.prompt_chars(),
                prompt_tokens: self.estimator.estimate(&request.prompt_text()),
                source,
            })
    }
}

/// Split a keyword reply on commas (ASCII or CJK) and newlines, strip list
/// markers, drop case-insensitive duplicates and keep at most `max`.
pub fn parse_keywords(reply: &str, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    reply
        .split([',', '，', '、', '\n'])
        .map(|k| {
            k.trim()
                .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•' || c == '#')
                .trim()
                .trim_matches('"')
                .to_string()
        })
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .take(max)
        .collect()
}
