//! Persistence for support chats and their messages.

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ClosedChatPolicy;
use crate::db::{Chat, ChatMessage, ChatStatus, DbPool};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat not found")]
    NotFound,
    #[error("Chat is closed")]
    Closed,
    #[error("Not a participant of this chat")]
    Forbidden,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub async fn create(db: &DbPool, user_id: &str) -> Result<Chat, ChatError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(ChatError::Invalid("user_id is required".to_string()));
    }

    let chat: Chat = sqlx::query_as(
        "INSERT INTO chats (id, user_id, status, created_at) VALUES (?, ?, ?, ?) RETURNING *",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(ChatStatus::Active.to_string())
    .bind(Utc::now().to_rfc3339())
    .fetch_one(db)
    .await?;

    tracing::info!(chat_id = %chat.id, user_id = %chat.user_id, "Chat created");
    Ok(chat)
}

pub async fn get(db: &DbPool, chat_id: &str) -> Result<Option<Chat>, ChatError> {
    let chat = sqlx::query_as("SELECT * FROM chats WHERE id = ?")
        .bind(chat_id)
        .fetch_optional(db)
        .await?;
    Ok(chat)
}

/// Store one message.
///
/// With [`ClosedChatPolicy::Reject`] the status check and the insert are a
/// single statement, so a message can never land after the close.
pub async fn append_message(
    db: &DbPool,
    chat_id: &str,
    sender: &str,
    content: &str,
    policy: ClosedChatPolicy,
) -> Result<ChatMessage, ChatError> {
    if content.is_empty() {
        return Err(ChatError::Invalid("Message content cannot be empty".to_string()));
    }

    let timestamp = Utc::now().to_rfc3339();
    let required_status = match policy {
        ClosedChatPolicy::Reject => "AND status = 'active'",
        ClosedChatPolicy::Accept => "",
    };

    let sql = format!(
        r#"
        INSERT INTO chat_messages (chat_id, sender, content, timestamp)
        SELECT ?, ?, ?, ?
        WHERE EXISTS (SELECT 1 FROM chats WHERE id = ? {})
        "#,
        required_status
    );

    let result = sqlx::query(&sql)
        .bind(chat_id)
        .bind(sender)
        .bind(content)
        .bind(&timestamp)
        .bind(chat_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return match get(db, chat_id).await? {
            None => Err(ChatError::NotFound),
            Some(_) => Err(ChatError::Closed),
        };
    }

    Ok(ChatMessage {
        sender: sender.to_string(),
        content: content.to_string(),
        timestamp,
    })
}

/// Mark a chat inactive. Closing an already closed chat is a no-op.
pub async fn close(db: &DbPool, chat_id: &str) -> Result<(), ChatError> {
    let result = sqlx::query("UPDATE chats SET status = ? WHERE id = ?")
        .bind(ChatStatus::Inactive.to_string())
        .bind(chat_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ChatError::NotFound);
    }

    tracing::info!(chat_id = %chat_id, "Chat closed");
    Ok(())
}

/// Messages of a chat in insertion order
pub async fn history(db: &DbPool, chat_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
    if get(db, chat_id).await?.is_none() {
        return Err(ChatError::NotFound);
    }

    let messages = sqlx::query_as(
        "SELECT sender, content, timestamp FROM chat_messages WHERE chat_id = ? ORDER BY id ASC",
    )
    .bind(chat_id)
    .fetch_all(db)
    .await?;
    Ok(messages)
}

pub async fn active_chats(db: &DbPool) -> Result<Vec<Chat>, ChatError> {
    let chats = sqlx::query_as("SELECT * FROM chats WHERE status = 'active' ORDER BY created_at ASC")
        .fetch_all(db)
        .await?;
    Ok(chats)
}

/// Most recent active chat of a user
pub async fn active_chat_for_user(db: &DbPool, user_id: &str) -> Result<Option<Chat>, ChatError> {
    let chat = sqlx::query_as(
        "SELECT * FROM chats WHERE user_id = ? AND status = 'active' ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(chat)
}
