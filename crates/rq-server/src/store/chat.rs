use chrono::{DateTime, Utc};
use rq_core::{ChatRole, ChatTurn, Result};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: String,
    pub user_id: String,
    pub data_source_id: Uuid,
    pub sender: String,
    pub message_content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Convert a stored row into an agent-facing turn, when the sender is a
    /// conversational role.
    pub fn as_turn(&self) -> Option<ChatTurn> {
        match self.sender.parse::<ChatRole>() {
            Ok(ChatRole::User) => Some(ChatTurn::user(&self.message_content)),
            Ok(ChatRole::Llm) => Some(ChatTurn::llm(&self.message_content)),
            _ => None,
        }
    }
}

const COLUMNS: &str = "id, session_id, user_id, data_source_id, sender, message_content, timestamp";

#[derive(Clone)]
pub struct ChatHistoryStore {
    pool: PgPool,
}

impl ChatHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one message and return the stored row (with its committed
    /// timestamp, which later watermarks the summary task).
    pub async fn append(
        &self,
        session_id: &str,
        user_id: &str,
        data_source_id: Uuid,
        sender: ChatRole,
        content: &str,
    ) -> Result<ChatMessage> {
        let row = sqlx::query_as::<_, ChatMessage>(&format!(
            "INSERT INTO chat_history (session_id, user_id, data_source_id, sender, message_content) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        ))
        .bind(session_id)
        .bind(user_id)
        .bind(data_source_id)
        .bind(sender.to_string())
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// All messages of one (session, user, repo), oldest first.
    pub async fn session_history(
        &self,
        session_id: &str,
        user_id: &str,
        data_source_id: Uuid,
    ) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, ChatMessage>(&format!(
            "SELECT {COLUMNS} FROM chat_history \
             WHERE session_id = $1 AND user_id = $2 AND data_source_id = $3 \
             ORDER BY timestamp ASC"
        ))
        .bind(session_id)
        .bind(user_id)
        .bind(data_source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Messages of one (user, repo) newer than `after`, oldest first. With
    /// `after = None` the full history is returned.
    pub async fn user_repo_messages_after(
        &self,
        user_id: &str,
        data_source_id: Uuid,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>> {
        let rows = match after {
            Some(after) => {
                sqlx::query_as::<_, ChatMessage>(&format!(
                    "SELECT {COLUMNS} FROM chat_history \
                     WHERE user_id = $1 AND data_source_id = $2 AND timestamp > $3 \
                     ORDER BY timestamp ASC"
                ))
                .bind(user_id)
                .bind(data_source_id)
                .bind(after)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ChatMessage>(&format!(
                    "SELECT {COLUMNS} FROM chat_history \
                     WHERE user_id = $1 AND data_source_id = $2 \
                     ORDER BY timestamp ASC"
                ))
                .bind(user_id)
                .bind(data_source_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// Every message the user has ever sent or received, oldest first.
    pub async fn user_messages(&self, user_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, ChatMessage>(&format!(
            "SELECT {COLUMNS} FROM chat_history WHERE user_id = $1 ORDER BY timestamp ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
