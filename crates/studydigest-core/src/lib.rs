//! # StudyDigest Core
//!
//! The adaptive summarization and retrieval-augmented chat pipeline:
//! data models, normalization, token estimation, chunking strategies,
//! hierarchical reduction, two-stage retrieval, context assembly and
//! token budgeting.
//!
//! This crate contains no tokio runtime, sqlx, HTTP client or filesystem
//! I/O. The two external services are reached only through the
//! [`EmbeddingClient`](embedding::EmbeddingClient) and
//! [`GenerationClient`](generation::GenerationClient) traits, and stored
//! fragments only through [`FragmentStore`](store::FragmentStore); the
//! `studydigest` crate provides the concrete implementations.
//!
//! # Summarization
//!
//! ```text
//! raw text → normalize → estimate tokens → select strategy
//!          → { one call | recursive windows | semantic groups }
//!          → per-chunk summaries → hierarchical reduce → SummaryResult
//! ```
//!
//! # Chat
//!
//! ```text
//! question → embed → first-stage top min(2k, 10) → re-rank top k
//!          → assemble bounded context → plan max_tokens → generate
//! ```

pub mod budget;
pub mod chat;
pub mod chunk;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod normalize;
pub mod paragraph;
pub mod reduce;
pub mod rerank;
pub mod retrieve;
pub mod semantic;
pub mod store;
pub mod strategy;
pub mod summarize;
pub mod tokens;

#[cfg(test)]
mod testutil;
