use anyhow::{bail, Result};

use studydigest_core::chat::{AnswerStatus, ChatPipeline};
use studydigest_core::models::Scope;

use crate::config::Config;
use crate::sqlite_store::SqliteFragmentStore;
use crate::turns::ConversationLog;
use crate::{db, embedding, generation};

/// Answer a question from the owner's ingested fragments.
///
/// Answered turns are appended to the conversation log; diagnostics and
/// "no relevant content" replies are not.
pub async fn run_ask(
    config: &Config,
    question: &str,
    owner_id: &str,
    document_id: Option<String>,
    full: bool,
    json: bool,
) -> Result<()> {
    if question.trim().is_empty() {
        bail!("Question is empty.");
    }
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    if !config.generation.is_enabled() {
        bail!("Generation provider is disabled. Set [generation] provider in config.");
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let pool = db::connect(config).await?;
    let store = std::sync::Arc::new(SqliteFragmentStore::new(
        pool.clone(),
        embedder.model_name(),
        embedder.dims(),
    ));
    let log = ConversationLog::new(pool.clone());
    let generator = generation::create_client(&config.generation)?;
    let chat = config.chat_config();
    let history_turns = chat.history_turns;
    let pipeline = ChatPipeline::new(embedder, store, generator, chat)?;

    let scope = match &document_id {
        Some(id) => Scope::document(owner_id, id.as_str()),
        None => Scope::owner(owner_id),
    };
    let history = log
        .recent(owner_id, document_id.as_deref(), history_turns)
        .await?;

    let answer = pipeline.answer(question, &scope, &history, full).await?;

    if answer.status == AnswerStatus::Answered {
        log.record(owner_id, document_id.as_deref(), question, &answer.text)
            .await?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        println!("{}", answer.text);
        if !answer.sources.is_empty() {
            println!();
            println!("Sources:");
            for (i, source) in answer.sources.iter().enumerate() {
                println!(
                    "  [{}] {} #{}  (score {:.3})",
                    i + 1,
                    source.chunk.document_id,
                    source.chunk.chunk_index,
                    source.effective_score()
                );
            }
        }
    }

    pool.close().await;
    if answer.status == AnswerStatus::GenerationFailed {
        bail!("answer generation failed");
    }
    Ok(())
}
