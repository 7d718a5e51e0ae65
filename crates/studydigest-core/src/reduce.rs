//! Hierarchical reduction of partial summaries.
//!
//! While more than `group_size` partials remain, each consecutive group of
//! `group_size` is combined into one intermediate summary by a generation
//! call. Once the list is short enough, a final combine call produces the
//! result. Every combine prompt therefore holds at most `group_size`
//! partials no matter how long the source document was.
//!
//! Implemented as an iterative worklist; each level's list is dropped
//! when the next one is built.

use std::sync::Arc;

use tracing::debug;

use crate::error::{ConfigError, SummarizeError};
use crate::generation::{GenerationClient, GenerationRequest};
use crate::tokens::TokenEstimator;

pub const DEFAULT_GROUP_SIZE: usize = 3;
pub const DEFAULT_FINAL_MAX_TOKENS: usize = 2000;
pub const DEFAULT_INTERMEDIATE_MAX_TOKENS: usize = 1000;

pub const COMBINE_INSTRUCTION: &str = "You merge partial summaries of one document into a single \
coherent summary. Keep every distinct key point, remove repetition, and preserve the original \
order of topics. Answer in the language of the parts.";

const PART_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq)]
pub struct ReducerConfig {
    pub group_size: usize,
    pub final_max_tokens: usize,
    pub intermediate_max_tokens: usize,
    pub temperature: f32,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            group_size: DEFAULT_GROUP_SIZE,
            final_max_tokens: DEFAULT_FINAL_MAX_TOKENS,
            intermediate_max_tokens: DEFAULT_INTERMEDIATE_MAX_TOKENS,
            temperature: 0.3,
        }
    }
}

/// Result of a reduction, with bookkeeping for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub text: String,
    /// Number of combine levels, including the final one.
    pub levels: usize,
    /// Number of generation calls issued.
    pub calls: usize,
}

pub struct HierarchicalReducer {
    generator: Arc<dyn GenerationClient>,
    config: ReducerConfig,
    estimator: TokenEstimator,
}

impl HierarchicalReducer {
    /// # Errors
    ///
    /// `group_size` below 2 would never shrink the list.
    pub fn new(generator: Arc<dyn GenerationClient>, config: ReducerConfig) -> Result<Self, ConfigError> {
        if config.group_size < 2 {
            return Err(ConfigError(format!(
                "reducer group_size must be >= 2, got {}",
                config.group_size
            )));
        }
        Ok(Self {
            generator,
            config,
            estimator: TokenEstimator::default(),
        })
    }

    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Reduce ordered partial summaries to one summary.
    pub async fn reduce(&self, partials: Vec<String>) -> Result<Reduction, SummarizeError> {
        if partials.is_empty() {
            return Err(SummarizeError::NothingToReduce);
        }

        let mut pending = partials;
        let mut levels = 0usize;
        let mut calls = 0usize;

        while pending.len() > self.config.group_size {
            let mut next = Vec::with_capacity(pending.len().div_ceil(self.config.group_size));
            for group in pending.chunks(self.config.group_size) {
                let merged = self
                    .combine(group, self.config.intermediate_max_tokens, "intermediate combine")
                    .await?;
                next.push(merged);
                calls += 1;
            }
            levels += 1;
            debug!(level = levels, from = pending.len(), to = next.len(), "reduced summary level");
            pending = next;
        }

        let text = self
            .combine(&pending, self.config.final_max_tokens, "final combine")
            .await?;

        Ok(Reduction {
            text,
            levels: levels + 1,
            calls: calls + 1,
        })
    }

    async fn combine(
        &self,
        parts: &[String],
        max_tokens: usize,
        stage: &'static str,
    ) -> Result<String, SummarizeError> {
        let body = parts
            .iter()
            .enumerate()
            .map(|(i, p)| format!("Part {}:\n{}", i + 1, p.trim()))
            .collect::<Vec<_>>()
            .join(PART_SEPARATOR);

        let request = GenerationRequest::instruct(
            COMBINE_INSTRUCTION,
            body,
            max_tokens,
            self.config.temperature,
        );

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
