use agentcanvas_core::entity::{AgentState, AgentStateUpsert};
use agentcanvas_core::error::StoreError;
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use tracing::debug;
use uuid::Uuid;

use crate::rows::{self, db, not_found};
use crate::{Page, SqliteStore};

const COLUMNS: &str = "id, conversation_id, agent_id, state_data, version, created_at, updated_at";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentStateFilter {
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub agent_id: Option<Uuid>,
}

fn row_to_state(row: &SqliteRow) -> Result<AgentState, StoreError> {
    Ok(AgentState {
        id: rows::uuid(row, "id")?,
        conversation_id: rows::uuid(row, "conversation_id")?,
        agent_id: rows::uuid(row, "agent_id")?,
        state_data: rows::json_map(row, "state_data")?,
        version: rows::opt_text(row, "version")?,
        created_at: rows::time(row, "created_at")?,
        updated_at: rows::opt_time(row, "updated_at")?,
    })
}

impl SqliteStore {
    /// Insert or replace the state of one agent in one conversation.
    ///
    /// The row id and `created_at` of an existing snapshot are kept.
    pub async fn upsert_state(&self, upsert: AgentStateUpsert) -> Result<AgentState, StoreError> {
        self.require_conversation(upsert.conversation_id).await?;
        self.require_agent(upsert.agent_id).await?;

        sqlx::query(
            r#"
            INSERT INTO agent_states (id, conversation_id, agent_id, state_data, version, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(conversation_id, agent_id) DO UPDATE SET
                state_data = excluded.state_data,
                version    = excluded.version,
                updated_at = excluded.created_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(upsert.conversation_id.to_string())
        .bind(upsert.agent_id.to_string())
        .bind(rows::to_json(&upsert.state_data)?)
        .bind(&upsert.version)
        .bind(rows::now())
        .execute(&self.pool)
        .await
        .map_err(db("upsert agent state"))?;

        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM agent_states WHERE conversation_id = ?1 AND agent_id = ?2"
        ))
        .bind(upsert.conversation_id.to_string())
        .bind(upsert.agent_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(db("select agent state"))?;

        debug!(
            conversation_id = %upsert.conversation_id,
            agent_id = %upsert.agent_id,
            "Upserted agent state"
        );
        row_to_state(&row)
    }

    pub async fn find_agent_state(&self, id: Uuid) -> Result<Option<AgentState>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM agent_states WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db("select agent state"))?;
        row.as_ref().map(row_to_state).transpose()
    }

    pub async fn require_agent_state(&self, id: Uuid) -> Result<AgentState, StoreError> {
        self.find_agent_state(id)
            .await?
            .ok_or_else(|| not_found("agent state", id))
    }

    pub async fn list_agent_states(
        &self,
        filter: &AgentStateFilter,
        page: Page,
    ) -> Result<Vec<AgentState>, StoreError> {
        let found = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM agent_states
            WHERE (?1 IS NULL OR conversation_id = ?1) AND (?2 IS NULL OR agent_id = ?2)
            ORDER BY created_at, id
            LIMIT ?3 OFFSET ?4
            "#
        ))
        .bind(filter.conversation_id.map(|c| c.to_string()))
        .bind(filter.agent_id.map(|a| a.to_string()))
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db("list agent states"))?;
        found.iter().map(row_to_state).collect()
    }

    pub async fn delete_agent_state(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM agent_states WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db("delete agent state"))?;
        if result.rows_affected() == 0 {
            return Err(not_found("agent state", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    fn snapshot(conversation_id: Uuid, agent_id: Uuid, steps: u64) -> AgentStateUpsert {
        AgentStateUpsert {
            conversation_id,
            agent_id,
            state_data: serde_json::json!({ "steps": steps }).as_object().cloned().unwrap(),
            version: None,
        }
    }

    #[tokio::test]
    async fn upsert_updates_in_place() {
        let store = store().await;
        let conv = conversation(&store).await;
        let a = agent(&store, "Stateful").await;

        let first = store.upsert_state(snapshot(conv.id, a.id, 2)).await.unwrap();
        assert!(first.updated_at.is_none());

        let second = store.upsert_state(snapshot(conv.id, a.id, 4)).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.state_data["steps"], 4);
        assert!(second.updated_at.is_some());

        let filter = AgentStateFilter {
            conversation_id: Some(conv.id),
            agent_id: None,
        };
        assert_eq!(store.list_agent_states(&filter, Page::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_state() {
        let store = store().await;
        let conv = conversation(&store).await;
        let a = agent(&store, "Ephemeral").await;
        let state = store.upsert_state(snapshot(conv.id, a.id, 1)).await.unwrap();

        store.delete_agent_state(state.id).await.unwrap();
        assert!(store.find_agent_state(state.id).await.unwrap().is_none());
    }
}
