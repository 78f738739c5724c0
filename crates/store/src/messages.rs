use agentcanvas_core::error::StoreError;
use agentcanvas_core::message::{Message, NewMessage, Role};
use agentcanvas_core::tool::ToolCall;
use sqlx::sqlite::SqliteRow;
use tracing::debug;
use uuid::Uuid;

use crate::rows::{self, db, not_found};
use crate::{Page, SqliteStore};

const COLUMNS: &str =
    "seq, id, conversation_id, agent_id, role, content, tool_calls, tool_call_id, metadata, created_at";

fn row_to_message(row: &SqliteRow) -> Result<Message, StoreError> {
    let role: Role = rows::text(row, "role")?
        .parse()
        .map_err(StoreError::Corrupt)?;
    let tool_calls: Option<Vec<ToolCall>> = rows::opt_text(row, "tool_calls")?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| StoreError::Corrupt(format!("tool_calls: {e}")))?;

    Ok(Message {
        id: rows::uuid(row, "id")?,
        conversation_id: rows::uuid(row, "conversation_id")?,
        agent_id: rows::opt_uuid(row, "agent_id")?,
        role,
        content: rows::text(row, "content")?,
        tool_calls,
        tool_call_id: rows::opt_text(row, "tool_call_id")?,
        metadata: rows::json_map(row, "metadata")?,
        created_at: rows::time(row, "created_at")?,
    })
}

impl SqliteStore {
    /// Append a message to an existing conversation.
    pub async fn append_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        self.require_conversation(new.conversation_id).await?;

        let id = Uuid::new_v4();
        let tool_calls = new.tool_calls.as_ref().map(rows::to_json).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, agent_id, role, content, tool_calls, tool_call_id, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(id.to_string())
        .bind(new.conversation_id.to_string())
        .bind(new.agent_id.map(|a| a.to_string()))
        .bind(new.role.as_str())
        .bind(&new.content)
        .bind(tool_calls)
        .bind(&new.tool_call_id)
        .bind(rows::to_json(&new.metadata)?)
        .bind(rows::now())
        .execute(&self.pool)
        .await
        .map_err(db("insert message"))?;

        debug!(
            conversation_id = %new.conversation_id,
            message_id = %id,
            role = %new.role,
            "Appended message"
        );
        self.require_message(id).await
    }

    pub async fn find_message(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db("select message"))?;
        row.as_ref().map(row_to_message).transpose()
    }

    pub async fn require_message(&self, id: Uuid) -> Result<Message, StoreError> {
        self.find_message(id).await?.ok_or_else(|| not_found("message", id))
    }

    /// Messages of a conversation in chronological order.
    pub async fn list_messages(&self, conversation_id: Uuid, page: Page) -> Result<Vec<Message>, StoreError> {
        let found = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM messages
            WHERE conversation_id = ?1
            ORDER BY created_at, seq
            LIMIT ?2 OFFSET ?3
            "#
        ))
        .bind(conversation_id.to_string())
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db("list messages"))?;
        found.iter().map(row_to_message).collect()
    }

    /// The most recent `limit` messages, returned oldest first.
    pub async fn list_recent_messages(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>, StoreError> {
        let found = sqlx::query(&format!(
            r#"
            SELECT * FROM (
                SELECT {COLUMNS} FROM messages
                WHERE conversation_id = ?1
                ORDER BY created_at DESC, seq DESC
                LIMIT ?2
            )
            ORDER BY created_at, seq
            "#
        ))
        .bind(conversation_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db("list recent messages"))?;
        found.iter().map(row_to_message).collect()
    }
}
