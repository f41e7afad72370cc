// crates/store/src/indexer.rs
//! Upserts a parsed conversation (and its messages) into the store.
//!
//! One call is one atomic write-batch: conversation row, then messages,
//! committed together so partial state is impossible. Re-ingesting a file
//! with no new lines is a no-op (modulo `updated_at`); re-ingesting a file
//! with only new trailing lines inserts just the suffix (transcripts are
//! treated as append-only).

use crate::{DbError, DbResult, Store};
use conversant_core::types::ParsedConversation;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub conversation_id: i64,
    pub is_new: bool,
    pub messages_inserted: usize,
}

/// Upsert a parsed conversation by `session_id` and append any new messages.
///
/// Never trusts the driver's last-inserted-rowid after a conflict-upsert —
/// the row's id is re-read by `session_id` once the statement has run.
pub async fn upsert_conversation(store: &Store, conversation: &ParsedConversation) -> DbResult<UpsertOutcome> {
    let file_references = serde_json::to_string(&conversation.file_references).unwrap();
    let topics = serde_json::to_string(&conversation.topics).unwrap();
    let keywords = serde_json::to_string(&conversation.keywords).unwrap();
    let total_tokens = conversation.total_tokens();
    let message_count = conversation.message_count() as i64;

    let mut tx = store.pool().begin().await?;

    let existing: Option<(i64, i64)> = sqlx::query_as(
        "SELECT id, message_count FROM conversations WHERE session_id = ?",
    )
    .bind(&conversation.session_id)
    .fetch_optional(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO conversations
            (session_id, project_path, project_name, created_at, updated_at,
             message_count, total_tokens, file_references, topics, keywords)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(session_id) DO UPDATE SET
            project_path = excluded.project_path,
            project_name = excluded.project_name,
            updated_at = excluded.updated_at,
            message_count = excluded.message_count,
            total_tokens = excluded.total_tokens,
            file_references = excluded.file_references,
            topics = excluded.topics,
            keywords = excluded.keywords",
    )
    .bind(&conversation.session_id)
    .bind(&conversation.project_path)
    .bind(&conversation.project_name)
    .bind(conversation.created_at)
    .bind(conversation.updated_at)
    .bind(message_count)
    .bind(total_tokens)
    .bind(&file_references)
    .bind(&topics)
    .bind(&keywords)
    .execute(&mut *tx)
    .await?;

    let (conversation_id,): (i64,) = sqlx::query_as(
        "SELECT id FROM conversations WHERE session_id = ?",
    )
    .bind(&conversation.session_id)
    .fetch_one(&mut *tx)
    .await?;

    let is_new = existing.is_none();
    let prior_message_count = existing.map(|(_, count)| count).unwrap_or(0);

    let new_messages: Vec<_> = conversation
        .messages
        .iter()
        .filter(|m| m.message_index as i64 >= prior_message_count)
        .collect();

    for message in &new_messages {
        let tool_calls = serde_json::to_string(&message.tool_calls).unwrap();
        let msg_file_refs = serde_json::to_string(&message.file_references).unwrap();

        sqlx::query(
            "INSERT INTO messages
                (conversation_id, message_index, uuid, timestamp, role, content_type,
                 content, content_summary, tool_calls, file_references, tokens)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(conversation_id, message_index) DO NOTHING",
        )
        .bind(conversation_id)
        .bind(message.message_index as i64)
        .bind(&message.uuid)
        .bind(&message.timestamp)
        .bind(message.role.as_str())
        .bind(&message.content_type)
        .bind(&message.content)
        .bind(&message.content_summary)
        .bind(&tool_calls)
        .bind(&msg_file_refs)
        .bind(message.tokens)
        .execute(&mut *tx)
        .await
        .map_err(DbError::Sqlx)?;
    }

    tx.commit().await?;

    update_counters(store).await?;

    Ok(UpsertOutcome {
        conversation_id,
        is_new,
        messages_inserted: new_messages.len(),
    })
}

async fn update_counters(store: &Store) -> DbResult<()> {
    let (total_conversations,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
        .fetch_one(store.pool())
        .await?;
    let (total_messages,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
        .fetch_one(store.pool())
        .await?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    store.set_stat("total_conversations", &total_conversations.to_string()).await?;
    store.set_stat("total_messages", &total_messages.to_string()).await?;
    store.set_stat("last_incremental_index", &now.to_string()).await?;
    Ok(())
}
