use agentcanvas_core::entity::{Agent, AgentUpdate, NewAgent};
use agentcanvas_core::error::StoreError;
use sqlx::sqlite::SqliteRow;
use tracing::debug;
use uuid::Uuid;

use crate::rows::{self, db, not_found};
use crate::{Page, SqliteStore};

const COLUMNS: &str = "id, name, description, system_prompt, config, created_at, updated_at";

fn row_to_agent(row: &SqliteRow) -> Result<Agent, StoreError> {
    Ok(Agent {
        id: rows::uuid(row, "id")?,
        name: rows::text(row, "name")?,
        description: rows::opt_text(row, "description")?,
        system_prompt: rows::opt_text(row, "system_prompt")?,
        config: rows::json_map(row, "config")?,
        created_at: rows::time(row, "created_at")?,
        updated_at: rows::opt_time(row, "updated_at")?,
    })
}

impl SqliteStore {
    pub async fn create_agent(&self, new: NewAgent) -> Result<Agent, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO agents (id, name, description, system_prompt, config, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(id.to_string())
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.system_prompt)
        .bind(rows::to_json(&new.config)?)
        .bind(rows::now())
        .execute(&self.pool)
        .await
        .map_err(db("insert agent"))?;

        debug!(agent_id = %id, name = %new.name, "Created agent");
        self.require_agent(id).await
    }

    pub async fn find_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM agents WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db("select agent"))?;
        row.as_ref().map(row_to_agent).transpose()
    }

    pub async fn require_agent(&self, id: Uuid) -> Result<Agent, StoreError> {
        self.find_agent(id).await?.ok_or_else(|| not_found("agent", id))
    }

    pub async fn list_agents(&self, page: Page) -> Result<Vec<Agent>, StoreError> {
        let found = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM agents ORDER BY created_at, id LIMIT ?1 OFFSET ?2"
        ))
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db("list agents"))?;
        found.iter().map(row_to_agent).collect()
    }

    pub async fn update_agent(&self, id: Uuid, update: AgentUpdate) -> Result<Agent, StoreError> {
        let mut agent = self.require_agent(id).await?;
        if let Some(name) = update.name {
            agent.name = name;
        }
        if update.description.is_some() {
            agent.description = update.description;
        }
        if update.system_prompt.is_some() {
            agent.system_prompt = update.system_prompt;
        }
        if let Some(config) = update.config {
            agent.config = config;
        }

        sqlx::query(
            "UPDATE agents SET name = ?2, description = ?3, system_prompt = ?4, config = ?5, updated_at = ?6 WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.system_prompt)
        .bind(rows::to_json(&agent.config)?)
        .bind(rows::now())
        .execute(&self.pool)
        .await
        .map_err(db("update agent"))?;

        self.require_agent(id).await
    }

    pub async fn delete_agent(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db("delete agent"))?;
        if result.rows_affected() == 0 {
            return Err(not_found("agent", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use crate::Page;
    use agentcanvas_core::entity::AgentUpdate;
    use agentcanvas_core::error::StoreError;

    #[tokio::test]
    async fn create_and_get_agent() {
        let store = store().await;
        let created = agent(&store, "Researcher").await;
        let fetched = store.require_agent(created.id).await.unwrap();
        assert_eq!(fetched.name, "Researcher");
        assert_eq!(fetched.system_prompt.as_deref(), Some("You are Researcher."));
        assert!(fetched.updated_at.is_none());
    }

    #[tokio::test]
    async fn partial_update_keeps_untouched_fields() {
        let store = store().await;
        let created = agent(&store, "Writer").await;
        let config = serde_json::json!({"model": "gpt-4o", "tools": ["current_time"]});

        let updated = store
            .update_agent(
                created.id,
                AgentUpdate {
                    config: config.as_object().cloned(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Writer");
        assert_eq!(updated.profile().model.as_deref(), Some("gpt-4o"));
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn list_paginates_in_creation_order() {
        let store = store().await;
        for name in ["a", "b", "c"] {
            agent(&store, name).await;
        }
        let page = store.list_agents(Page::new(1, 1)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(store.list_agents(Page::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn delete_missing_agent_is_not_found() {
        let store = store().await;
        let created = agent(&store, "Temp").await;
        store.delete_agent(created.id).await.unwrap();
        assert!(store.find_agent(created.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_agent(created.id).await,
            Err(StoreError::NotFound { entity: "agent", .. })
        ));
    }
}
