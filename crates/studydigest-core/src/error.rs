//! Error types for the summarization and retrieval pipelines.

use thiserror::Error;

/// Failures reported by an [`EmbeddingClient`](crate::embedding::EmbeddingClient).
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network failure, timeout, or a non-success HTTP status.
    #[error("embedding service error ({provider}): {message}")]
    Service { provider: String, message: String },

    /// The service answered but the payload could not be used.
    #[error("malformed embedding response: {0}")]
    Malformed(String),

    #[error("embedding provider is disabled")]
    Disabled,
}

/// Failures reported by a [`GenerationClient`](crate::generation::GenerationClient).
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service error ({provider}): {message}")]
    Service { provider: String, message: String },

    #[error("generation request timed out after {0}s")]
    Timeout(u64),

    /// Missing `choices` / `message` in an otherwise successful reply.
    #[error("malformed generation response: {0}")]
    Malformed(String),

    #[error("generation provider is disabled")]
    Disabled,
}

/// Invalid component parameters.
#[derive(Debug, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Failures of a summarization attempt.
///
/// The orchestrator matches on these to decide whether to fall back to a
/// different strategy.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("document is empty after normalization")]
    EmptyDocument,

    /// No paragraph survived the splitter's size floor.
    #[error("semantic chunking produced no paragraphs")]
    ChunkingDegeneracy,

    #[error("nothing to reduce")]
    NothingToReduce,

    /// A generation call failed; carries the size of the prompt that failed.
    #[error("{stage} generation failed: {source}")]
    Generation {
        stage: &'static str,
        prompt_chars: usize,
        prompt_tokens: usize,
        #[source]
        source: GenerationError,
    },
}

impl SummarizeError {
    /// User-visible diagnostic text, including prompt size statistics when
    /// the failure came from the generation service.
    pub fn diagnostic(&self) -> String {
        match self {
            SummarizeError::Generation {
                stage,
                prompt_chars,
                prompt_tokens,
                source,
            } => format!(
                "Summary generation failed during the {} step: {}. \
                 Prompt size: {} characters (~{} tokens).",
                stage, source, prompt_chars, prompt_tokens
            ),
            other => format!("Summary could not be produced: {}.", other),
        }
    }
}

/// Failures of the retrieval stages.
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("fragment store query failed: {0}")]
    Store(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_diagnostic_includes_prompt_stats() {
        let err = SummarizeError::Generation {
            stage: "combine",
            prompt_chars: 12_000,
            prompt_tokens: 4_800,
            source: GenerationError::Timeout(60),
        };
        let msg = err.diagnostic();
        assert!(msg.contains("combine"));
        assert!(msg.contains("12000 characters"));
        assert!(msg.contains("~4800 tokens"));
        assert!(msg.contains("timed out after 60s"));
    }

    #[test]
    fn test_non_generation_diagnostic() {
        let msg = SummarizeError::EmptyDocument.diagnostic();
        assert!(msg.contains("empty"));
    }
}
