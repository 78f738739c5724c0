use agentcanvas_core::entity::{Conversation, ConversationUpdate, NewConversation};
use agentcanvas_core::error::StoreError;
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use tracing::debug;
use uuid::Uuid;

use crate::rows::{self, db, not_found};
use crate::{Page, SqliteStore};

const COLUMNS: &str = "id, team_id, user_id, title, metadata, created_at, updated_at";

/// Optional equality filters for listing conversations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationFilter {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<Uuid>,
}

fn row_to_conversation(row: &SqliteRow) -> Result<Conversation, StoreError> {
    Ok(Conversation {
        id: rows::uuid(row, "id")?,
        team_id: rows::opt_uuid(row, "team_id")?,
        user_id: rows::opt_text(row, "user_id")?,
        title: rows::opt_text(row, "title")?,
        metadata: rows::json_map(row, "metadata")?,
        created_at: rows::time(row, "created_at")?,
        updated_at: rows::opt_time(row, "updated_at")?,
    })
}

impl SqliteStore {
    pub async fn create_conversation(&self, new: NewConversation) -> Result<Conversation, StoreError> {
        self.insert_conversation(Uuid::new_v4(), new).await
    }

    /// Create a conversation under a caller-chosen id.
    pub async fn insert_conversation(&self, id: Uuid, new: NewConversation) -> Result<Conversation, StoreError> {
        if let Some(team_id) = new.team_id {
            self.require_team(team_id).await?;
        }

        sqlx::query(
            "INSERT INTO conversations (id, team_id, user_id, title, metadata, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(id.to_string())
        .bind(new.team_id.map(|t| t.to_string()))
        .bind(&new.user_id)
        .bind(&new.title)
        .bind(rows::to_json(&new.metadata)?)
        .bind(rows::now())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(d) if d.is_unique_violation() => {
                StoreError::Conflict(format!("conversation {id} already exists"))
            }
            _ => StoreError::Database(format!("insert conversation: {e}")),
        })?;

        debug!(conversation_id = %id, "Created conversation");
        self.require_conversation(id).await
    }

    /// Fetch a conversation, creating an empty one under `id` if it does not exist.
    pub async fn ensure_conversation(
        &self,
        id: Uuid,
        user_id: Option<String>,
    ) -> Result<Conversation, StoreError> {
        if let Some(existing) = self.find_conversation(id).await? {
            return Ok(existing);
        }
        let new = NewConversation {
            user_id,
            ..Default::default()
        };
        match self.insert_conversation(id, new).await {
            // Lost a race with a concurrent request for the same id.
            Err(StoreError::Conflict(_)) => self.require_conversation(id).await,
            other => other,
        }
    }

    pub async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db("select conversation"))?;
        row.as_ref().map(row_to_conversation).transpose()
    }

    pub async fn require_conversation(&self, id: Uuid) -> Result<Conversation, StoreError> {
        self.find_conversation(id)
            .await?
            .ok_or_else(|| not_found("conversation", id))
    }

    pub async fn list_conversations(
        &self,
        filter: &ConversationFilter,
        page: Page,
    ) -> Result<Vec<Conversation>, StoreError> {
        let found = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM conversations
            WHERE (?1 IS NULL OR user_id = ?1) AND (?2 IS NULL OR team_id = ?2)
            ORDER BY created_at DESC, id
            LIMIT ?3 OFFSET ?4
            "#
        ))
        .bind(&filter.user_id)
        .bind(filter.team_id.map(|t| t.to_string()))
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db("list conversations"))?;
        found.iter().map(row_to_conversation).collect()
    }

    pub async fn update_conversation(
        &self,
        id: Uuid,
        update: ConversationUpdate,
    ) -> Result<Conversation, StoreError> {
        let mut conversation = self.require_conversation(id).await?;
        if update.title.is_some() {
            conversation.title = update.title;
        }
        if let Some(metadata) = update.metadata {
            conversation.metadata = metadata;
        }

        sqlx::query("UPDATE conversations SET title = ?2, metadata = ?3, updated_at = ?4 WHERE id = ?1")
            .bind(id.to_string())
            .bind(&conversation.title)
            .bind(rows::to_json(&conversation.metadata)?)
            .bind(rows::now())
            .execute(&self.pool)
            .await
            .map_err(db("update conversation"))?;

        self.require_conversation(id).await
    }

    /// Delete a conversation with its messages, agent states and evaluations.
    pub async fn delete_conversation(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db("delete conversation"))?;
        if result.rows_affected() == 0 {
            return Err(not_found("conversation", id));
        }
        Ok(())
    }
}
