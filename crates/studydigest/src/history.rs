use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::turns::ConversationLog;

/// Print the most recent conversation turns of an owner, oldest first.
pub async fn run_history(config: &Config, owner_id: &str, limit: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    let turns = ConversationLog::new(pool.clone())
        .recent(owner_id, None, limit)
        .await?;

    if turns.is_empty() {
        println!("No conversation history.");
    }
    for turn in &turns {
        println!("[{}]", turn.asked_at.format("%Y-%m-%d %H:%M:%S"));
        println!("Q: {}", turn.question);
        println!("A: {}", turn.answer);
        println!();
    }

    pool.close().await;
    Ok(())
}
