//! TOML configuration.
//!
//! Every section except `[db]` may be omitted; missing keys fall back to
//! the pipeline's standard constants. API keys are read from the
//! environment (`OPENAI_API_KEY`), never from the file.
//!
//! ```toml
//! [db]
//! path = "./data/digest.sqlite"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! context_window = 16384
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use studydigest_core::chat::ChatConfig;
use studydigest_core::context::ContextBudget;
use studydigest_core::summarize::SummarizerConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub summarize: SummarizeConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chat: ChatSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NormalizeConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

fn default_max_chars() -> usize {
    studydigest_core::normalize::DEFAULT_MAX_CHARS
}
fn default_chars_per_token() -> f64 {
    studydigest_core::tokens::DEFAULT_CHARS_PER_TOKEN
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SummarizeConfig {
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
    pub extract_keywords: bool,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        let d = SummarizerConfig::default();
        Self {
            simple_max_tokens: d.simple_max_tokens,
            semantic_min_tokens: d.semantic_min_tokens,
            chunk_size: d.chunk_size,
            chunk_overlap: d.chunk_overlap,
            min_paragraph_chars: d.min_paragraph_chars,
            max_paragraph_chars: d.max_paragraph_chars,
            target_paragraph_chars: d.target_paragraph_chars,
            similarity_threshold: d.similarity_threshold,
            max_semantic_chunk_chars: d.max_semantic_chunk_chars,
            simple_summary_tokens: d.simple_summary_tokens,
            recursive_chunk_tokens: d.recursive_chunk_tokens,
            semantic_chunk_tokens: d.semantic_chunk_tokens,
            final_summary_tokens: d.final_summary_tokens,
            intermediate_summary_tokens: d.intermediate_summary_tokens,
            group_size: d.group_size,
            extract_keywords: d.extract_keywords,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_fragment_chars")]
    pub fragment_chars: usize,
    #[serde(default = "default_fragment_overlap")]
    pub fragment_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    #[serde(default = "default_overfetch_cap")]
    pub overfetch_cap: usize,
    #[serde(default = "default_rerank_prefix_chars")]
    pub rerank_prefix_chars: usize,
    /// `"compact"` or `"full"`; `ask --full` always selects full.
    #[serde(default = "default_context_mode")]
    pub context_mode: String,
    #[serde(default)]
    pub compact_budget: Option<ContextBudget>,
    #[serde(default)]
    pub full_budget: Option<ContextBudget>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fragment_chars: default_fragment_chars(),
            fragment_overlap: default_fragment_overlap(),
            top_k: default_top_k(),
            overfetch_factor: default_overfetch_factor(),
            overfetch_cap: default_overfetch_cap(),
            rerank_prefix_chars: default_rerank_prefix_chars(),
            context_mode: default_context_mode(),
            compact_budget: None,
            full_budget: None,
        }
    }
}

fn default_fragment_chars() -> usize {
    800
}
fn default_fragment_overlap() -> usize {
    100
}
fn default_top_k() -> usize {
    studydigest_core::chat::DEFAULT_TOP_K
}
fn default_overfetch_factor() -> usize {
    studydigest_core::retrieve::DEFAULT_OVERFETCH_FACTOR
}
fn default_overfetch_cap() -> usize {
    studydigest_core::retrieve::DEFAULT_OVERFETCH_CAP
}
fn default_rerank_prefix_chars() -> usize {
    studydigest_core::rerank::DEFAULT_PREFIX_CHARS
}
fn default_context_mode() -> String {
    "compact".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for `ollama` and `http` providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Chat-completions base URL; defaults to the OpenAI API.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            context_window: default_context_window(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_context_window() -> usize {
    studydigest_core::budget::DEFAULT_CONTEXT_WINDOW
}
fn default_max_tokens() -> usize {
    studydigest_core::budget::DEFAULT_MAX_TOKENS
}
fn default_temperature() -> f32 {
    0.3
}
fn default_generation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatSection {
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            history_turns: default_history_turns(),
            system_prompt: None,
        }
    }
}

fn default_history_turns() -> usize {
    studydigest_core::chat::DEFAULT_HISTORY_TURNS
}

impl Config {
    /// Pipeline settings for the summarizer.
    pub fn summarizer_config(&self) -> SummarizerConfig {
        let s = &self.summarize;
        SummarizerConfig {
            max_input_chars: self.normalize.max_chars,
            chars_per_token: self.normalize.chars_per_token,
            simple_max_tokens: s.simple_max_tokens,
            semantic_min_tokens: s.semantic_min_tokens,
            chunk_size: s.chunk_size,
            chunk_overlap: s.chunk_overlap,
            min_paragraph_chars: s.min_paragraph_chars,
            max_paragraph_chars: s.max_paragraph_chars,
            target_paragraph_chars: s.target_paragraph_chars,
            similarity_threshold: s.similarity_threshold,
            max_semantic_chunk_chars: s.max_semantic_chunk_chars,
            simple_summary_tokens: s.simple_summary_tokens,
            recursive_chunk_tokens: s.recursive_chunk_tokens,
            semantic_chunk_tokens: s.semantic_chunk_tokens,
            final_summary_tokens: s.final_summary_tokens,
            intermediate_summary_tokens: s.intermediate_summary_tokens,
            group_size: s.group_size,
            temperature: self.generation.temperature,
            extract_keywords: s.extract_keywords,
            ..SummarizerConfig::default()
        }
    }

    /// Pipeline settings for RAG chat.
    pub fn chat_config(&self) -> ChatConfig {
        let r = &self.retrieval;
        let defaults = ChatConfig::default();
        let mut compact = r.compact_budget.unwrap_or(defaults.compact_budget);
        let full = r.full_budget.unwrap_or(defaults.full_budget);
        if r.context_mode == "full" {
            compact = full;
        }
        ChatConfig {
            top_k: r.top_k,
            history_turns: self.chat.history_turns,
            system_prompt: self
                .chat
                .system_prompt
                .clone()
                .unwrap_or(defaults.system_prompt),
            temperature: self.generation.temperature,
            compact_budget: compact,
            full_budget: full,
            context_window: self.generation.context_window,
            max_tokens: self.generation.max_tokens,
            overfetch_factor: r.overfetch_factor,
            overfetch_cap: r.overfetch_cap,
            rerank_prefix_chars: r.rerank_prefix_chars,
            chars_per_token: self.normalize.chars_per_token,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.normalize.max_chars == 0 {
        bail!("normalize.max_chars must be > 0");
    }
    if config.normalize.chars_per_token.is_nan() || config.normalize.chars_per_token <= 0.0 {
        bail!("normalize.chars_per_token must be > 0");
    }

    let s = &config.summarize;
    if s.chunk_size == 0 {
        bail!("summarize.chunk_size must be > 0");
    }
    if s.chunk_overlap >= s.chunk_size {
        bail!("summarize.chunk_overlap must be less than summarize.chunk_size");
    }
    if s.simple_max_tokens > s.semantic_min_tokens {
        bail!("summarize.simple_max_tokens must not exceed summarize.semantic_min_tokens");
    }
    if !(0.0..=1.0).contains(&s.similarity_threshold) {
        bail!("summarize.similarity_threshold must be in [0.0, 1.0]");
    }
    if s.group_size < 2 {
        bail!("summarize.group_size must be >= 2");
    }

    let r = &config.retrieval;
    if r.fragment_chars == 0 || r.fragment_overlap >= r.fragment_chars {
        bail!("retrieval.fragment_overlap must be less than retrieval.fragment_chars");
    }
    if r.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    match r.context_mode.as_str() {
        "compact" | "full" => {}
        other => bail!(
            "Unknown retrieval.context_mode: '{}'. Must be compact or full.",
            other
        ),
    }

    let e = &config.embedding;
    match e.provider.as_str() {
        "disabled" | "openai" | "ollama" | "http" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or http.",
            other
        ),
    }
    if e.is_enabled() {
        if e.dims.is_none() || e.dims == Some(0) {
            bail!("embedding.dims must be > 0 when provider is '{}'", e.provider);
        }
        if e.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                e.provider
            );
        }
        if e.provider == "http" && e.url.is_none() {
            bail!("embedding.url must be specified when provider is 'http'");
        }
        if e.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
    }

    let g = &config.generation;
    match g.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if g.is_enabled() && g.model.is_none() {
        bail!("generation.model must be specified when provider is '{}'", g.provider);
    }
    if g.max_tokens < studydigest_core::budget::MIN_GENERATION_TOKENS {
        bail!(
            "generation.max_tokens must be >= {}",
            studydigest_core::budget::MIN_GENERATION_TOKENS
        );
    }
    if g.context_window <= g.max_tokens {
        bail!("generation.context_window must be larger than generation.max_tokens");
    }

    Ok(())
}
