//! Conversation log: question/answer turns per owner.
//!
//! Turns are independent of the embedding model, so the log only needs the
//! pool.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use studydigest_core::models::ConversationTurn;

pub struct ConversationLog {
    pool: SqlitePool,
}

impl ConversationLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a turn. `document_id` is the document the question was
    /// restricted to, if any.
    pub async fn record(
        &self,
        owner_id: &str,
        document_id: Option<&str>,
        question: &str,
        answer: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO turns (id, owner_id, document_id, question, answer, asked_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(owner_id)
        .bind(document_id)
        .bind(question)
        .bind(answer)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The last `limit` turns of `owner_id`, oldest first.
    ///
    /// With `document_id` set, only turns asked against that document.
    pub async fn recent(
        &self,
        owner_id: &str,
        document_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT question, answer, asked_at
            FROM turns
            WHERE owner_id = ? AND (? IS NULL OR document_id = ?)
            ORDER BY asked_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(owner_id)
        .bind(document_id)
        .bind(document_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns: Vec<ConversationTurn> = rows
            .iter()
            .map(|row| {
                let ms: i64 = row.get("asked_at");
                ConversationTurn {
                    question: row.get("question"),
                    answer: row.get("answer"),
                    asked_at: DateTime::from_timestamp_millis(ms).unwrap_or_default(),
                }
            })
            .collect();
        turns.reverse();
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};

    async fn open(dir: &tempfile::TempDir) -> SqlitePool {
        let config = Config {
            db: DbConfig {
                path: dir.path().join("digest.sqlite"),
            },
            normalize: Default::default(),
            summarize: Default::default(),
            retrieval: Default::default(),
            embedding: Default::default(),
            generation: Default::default(),
            chat: Default::default(),
        };
        let pool = crate::db::connect(&config).await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_recent_turns_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::new(open(&dir).await);
        for i in 0..4 {
            log.record("alice", None, &format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
        }
        log.record("bob", None, "other", "x").await.unwrap();

        let turns = log.recent("alice", None, 3).await.unwrap();
        let questions: Vec<&str> = turns.iter().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["q1", "q2", "q3"]);
    }

    #[tokio::test]
    async fn test_document_filter() {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::new(open(&dir).await);
        log.record("alice", Some("alice/bio"), "cells?", "yes").await.unwrap();
        log.record("alice", Some("alice/history"), "wars?", "many").await.unwrap();
        log.record("alice", None, "anything?", "no").await.unwrap();

        let bio = log.recent("alice", Some("alice/bio"), 10).await.unwrap();
        assert_eq!(bio.len(), 1);
        assert_eq!(bio[0].answer, "yes");
        assert_eq!(log.recent("alice", None, 10).await.unwrap().len(), 3);
    }
}
