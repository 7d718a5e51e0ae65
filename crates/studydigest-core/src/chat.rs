//! Retrieval-augmented question answering.
//!
//! `question → VectorRetriever → ReRanker → ContextAssembler →
//! TokenBudgetPlanner → GenerationClient`.
//!
//! The pipeline never fails because of the generation service: a failed
//! call is turned into a [`AnswerStatus::GenerationFailed`] answer whose
//! text carries the prompt size. Only the fragment store can make
//! [`ChatPipeline::answer`] return an error.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::budget::{TokenBudgetPlanner, DEFAULT_CONTEXT_WINDOW, DEFAULT_MAX_TOKENS};
use crate::context::{ContextAssembler, ContextBudget};
use crate::embedding::Embedder;
use crate::error::{ConfigError, RetrieveError};
use crate::generation::{GenerationClient, GenerationRequest, Message};
use crate::models::{ConversationTurn, RetrievalCandidate, Scope};
use crate::rerank::{ReRanker, DEFAULT_PREFIX_CHARS};
use crate::retrieve::{VectorRetriever, DEFAULT_OVERFETCH_CAP, DEFAULT_OVERFETCH_FACTOR};
use crate::store::FragmentStore;
use crate::tokens::TokenEstimator;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_HISTORY_TURNS: usize = 3;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a study assistant. Answer the question using only \
the numbered context fragments from the user's notes. Cite fragments as [n]. If the context does \
not contain the answer, say so.";

pub const NO_RELEVANT_CONTENT: &str = "No relevant content was found in the stored notes for this question.";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub top_k: usize,
    pub history_turns: usize,
    pub system_prompt: String,
    pub temperature: f32,
    pub compact_budget: ContextBudget,
    pub full_budget: ContextBudget,
    pub context_window: usize,
    pub max_tokens: usize,
    pub overfetch_factor: usize,
    pub overfetch_cap: usize,
    pub rerank_prefix_chars: usize,
    pub chars_per_token: f64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            history_turns: DEFAULT_HISTORY_TURNS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.3,
            compact_budget: ContextBudget::compact(),
            full_budget: ContextBudget::full(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_tokens: DEFAULT_MAX_TOKENS,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            overfetch_cap: DEFAULT_OVERFETCH_CAP,
            rerank_prefix_chars: DEFAULT_PREFIX_CHARS,
            chars_per_token: crate::tokens::DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered,
    /// Nothing in scope; no generation call was made.
    NoRelevantContent,
    /// The generation call failed; `text` is a diagnostic.
    GenerationFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub status: AnswerStatus,
    pub text: String,
    /// Fragments that made it into the context, in rank order.
    pub sources: Vec<RetrievalCandidate>,
    pub max_tokens: usize,
    pub prompt_chars: usize,
}

pub struct ChatPipeline {
    retriever: VectorRetriever,
    reranker: ReRanker,
    planner: TokenBudgetPlanner,
    estimator: TokenEstimator,
    generator: Arc<dyn GenerationClient>,
    config: ChatConfig,
}

impl ChatPipeline {
    /// Assemble retriever, re-ranker and budget planner from `config`.
    ///
    /// `embedder` serves both retrieval stages, so query and fragment
    /// vectors come from the same model. Fails on a zero `top_k` or an
    /// invalid context window or estimator setting.
    pub fn new(
        embedder: Embedder,
        store: Arc<dyn FragmentStore>,
        generator: Arc<dyn GenerationClient>,
        config: ChatConfig,
    ) -> Result<Self, ConfigError> {
        if config.top_k == 0 {
            return Err(ConfigError("top_k must be > 0".to_string()));
        }
        let estimator = TokenEstimator::new(config.chars_per_token)?;
        let planner =
            TokenBudgetPlanner::new(config.context_window, config.max_tokens)?.with_estimator(estimator);
        let retriever = VectorRetriever::new(embedder.clone(), store)
            .with_overfetch(config.overfetch_factor, config.overfetch_cap);
        let reranker = ReRanker::new(embedder).with_prefix_chars(config.rerank_prefix_chars);

        Ok(Self {
            retriever,
            reranker,
            planner,
            estimator,
            generator,
            config,
        })
    }

    /// Answer `question` from the fragments in `scope`.
    ///
    /// `history` is the caller's recent conversation, oldest first; only
    /// the last `history_turns` entries are used. `full` selects the larger
    /// context budget.
    pub async fn answer(
        &self,
        question: &str,
        scope: &Scope,
        history: &[ConversationTurn],
        full: bool,
    ) -> Result<ChatAnswer, RetrieveError> {
        let k = self.config.top_k;
        let first = self.retriever.retrieve(question, scope, k).await?;
        if first.candidates.is_empty() {
            info!(scope = %scope.label(), "no relevant content");
            return Ok(ChatAnswer {
                status: AnswerStatus::NoRelevantContent,
                text: NO_RELEVANT_CONTENT.to_string(),
                sources: Vec::new(),
                max_tokens: 0,
                prompt_chars: 0,
            });
        }

        let ranked = self
            .reranker
            .rerank(question, first.query_vector.as_deref(), first.candidates, k)
            .await;

        let budget = if full {
            self.config.full_budget
        } else {
            self.config.compact_budget
        };
        let context = ContextAssembler::new(budget).assemble(&ranked);
        let sources: Vec<RetrievalCandidate> = ranked.into_iter().take(context.included).collect();

        let mut request = self.build_request(question, &context.text, history);
        let prompt_text = request.prompt_text();
        let plan = self.planner.plan_detailed(&prompt_text);
        if plan.over_budget {
            warn!(
                input_tokens = plan.input_tokens,
                available = plan.available,
                window = self.planner.context_window(),
                "prompt exhausts the context window, generation capped at the floor"
            );
        }
        request.max_tokens = plan.max_tokens;
        let prompt_chars = request.prompt_chars();

        match self.generator.generate(&request).await {
            Ok(text) => Ok(ChatAnswer {
                status: AnswerStatus::Answered,
                text: text.trim().to_string(),
                sources,
                max_tokens: plan.max_tokens,
                prompt_chars,
            }),
            Err(err) => {
                let prompt_tokens = self.estimator.estimate(&prompt_text);
                warn!(error = %err, prompt_chars, prompt_tokens, "answer generation failed");
                Ok(ChatAnswer {
                    status: AnswerStatus::GenerationFailed,
                    text: format!(
                        "The answer could not be generated: {}. Prompt size: {} characters (~{} tokens), \
                         max_tokens {}.",
                        err, prompt_chars, prompt_tokens, plan.max_tokens
                    ),
                    sources,
                    max_tokens: plan.max_tokens,
                    prompt_chars,
                })
            }
        }
    }

    fn build_request(
        &self,
        question: &str,
        context: &str,
        history: &[ConversationTurn],
    ) -> GenerationRequest {
        let skip = history.len().saturating_sub(self.config.history_turns);
        let mut messages = vec![Message::system(self.config.system_prompt.as_str())];
        for turn in &history[skip..] {
            messages.push(Message::user(turn.question.as_str()));
            messages.push(Message::assistant(turn.answer.as_str()));
        }
        messages.push(Message::user(format!(
            "Context:\n{}\n\nQuestion: {}",
            context, question
        )));

        GenerationRequest {
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::chunk::make_chunk;
    use crate::generation::Role;
    use crate::store::memory::InMemoryFragmentStore;
    use crate::testutil::{FakeEmbedding, FakeGeneration};

    fn setup(
        generation: Arc<FakeGeneration>,
        texts: &[&str],
    ) -> (ChatPipeline, Arc<FakeEmbedding>) {
        let fake = Arc::new(FakeEmbedding::new(&["mitosis", "treaty"]));
        let store = Arc::new(InMemoryFragmentStore::new());
        let estimator = TokenEstimator::default();
        for (i, text) in texts.iter().enumerate() {
            store.insert(
                "u1",
                make_chunk("doc1", i as i64, text, &estimator),
                fake.vector_for(text),
            );
        }
        let pipeline = ChatPipeline::new(
            Embedder::new(fake.clone()),
            store,
            generation,
            ChatConfig::default(),
        )
        .unwrap();
        (pipeline, fake)
    }

    fn turn(n: usize) -> ConversationTurn {
        ConversationTurn {
            question: format!("question {}", n),
            answer: format!("answer {}", n),
            asked_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_empty_scope_skips_generation() {
        let llm = Arc::new(FakeGeneration::numbered());
        let (pipeline, _) = setup(llm.clone(), &[]);
        let answer = pipeline
            .answer("what is mitosis?", &Scope::Owner("u1".into()), &[], false)
            .await
            .unwrap();
        assert_eq!(answer.status, AnswerStatus::NoRelevantContent);
        assert!(answer.sources.is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_answer_uses_best_fragments() {
        let llm = Arc::new(FakeGeneration::with(|_, _| Ok("  Cells divide.  ".to_string())));
        let (pipeline, _) = setup(
            llm.clone(),
            &[
                "treaty of westphalia treaty",
                "mitosis splits a cell; mitosis has phases",
                "mitosis and treaty",
            ],
        );
        let answer = pipeline
            .answer("mitosis", &Scope::document("u1", "doc1"), &[], false)
            .await
            .unwrap();

        assert_eq!(answer.status, AnswerStatus::Answered);
        assert_eq!(answer.text, "Cells divide.");
        assert_eq!(answer.sources[0].chunk.chunk_index, 1);
        assert!(answer.sources.len() <= DEFAULT_TOP_K);
        assert!((256..=DEFAULT_MAX_TOKENS).contains(&answer.max_tokens));

        let request = &llm.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        let user = &request.messages.last().unwrap().content;
        assert!(user.starts_with("Context:\n[1]\nmitosis splits a cell"));
        assert!(user.ends_with("Question: mitosis"));
        assert_eq!(request.max_tokens, answer.max_tokens);
    }

    #[tokio::test]
    async fn test_history_window_is_bounded() {
        let llm = Arc::new(FakeGeneration::numbered());
        let (pipeline, _) = setup(llm.clone(), &["mitosis basics"]);
        let history: Vec<_> = (0..5).map(turn).collect();
        pipeline
            .answer("mitosis", &Scope::Owner("u1".into()), &history, false)
            .await
            .unwrap();

        let request = &llm.requests()[0];
        // system + 3 turns × 2 + question
        assert_eq!(request.messages.len(), 8);
        assert_eq!(request.messages[1].content, "question 2");
        assert_eq!(request.messages[6].content, "answer 4");
    }

    #[tokio::test]
    async fn test_generation_failure_is_a_diagnostic_answer() {
        let llm = Arc::new(FakeGeneration::failing());
        let (pipeline, _) = setup(llm, &["mitosis basics"]);
        let answer = pipeline
            .answer("mitosis", &Scope::Owner("u1".into()), &[], false)
            .await
            .unwrap();
        assert_eq!(answer.status, AnswerStatus::GenerationFailed);
        assert!(answer.text.contains("Prompt size"));
        assert!(answer.text.contains(&format!("{} characters", answer.prompt_chars)));
        assert_eq!(answer.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_full_budget_keeps_more_text() {
        let long = format!("mitosis {}", "m".repeat(900));
        let llm = Arc::new(FakeGeneration::numbered());
        let (pipeline, _) = setup(llm.clone(), &[long.as_str()]);

        pipeline
            .answer("mitosis", &Scope::Owner("u1".into()), &[], false)
            .await
            .unwrap();
        pipeline
            .answer("mitosis", &Scope::Owner("u1".into()), &[], true)
            .await
            .unwrap();

        let requests = llm.requests();
        let compact = requests[0].messages.last().unwrap().content.chars().count();
        let full = requests[1].messages.last().unwrap().content.chars().count();
        assert!(full > compact);
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let fake = Arc::new(FakeEmbedding::new(&["x"]));
        let config = ChatConfig {
            top_k: 0,
            ..ChatConfig::default()
        };
        let result = ChatPipeline::new(
            Embedder::new(fake),
            Arc::new(InMemoryFragmentStore::new()),
            Arc::new(FakeGeneration::numbered()),
            config,
        );
        assert!(result.is_err());
    }
}
