//! Relational persistence for AgentCanvas.
//!
//! [`SqliteStore`] owns agents, teams and their membership, conversations,
//! messages, agent state snapshots and evaluation results. The agent graph
//! only sees it through the core store traits; the HTTP surface uses the
//! full CRUD API.

mod agent_states;
mod agents;
mod conversations;
mod evaluations;
mod messages;
mod rows;
mod schema;
mod teams;

use agentcanvas_core::entity::{Agent, AgentState, AgentStateUpsert, Conversation, TeamMember};
use agentcanvas_core::error::StoreError;
use agentcanvas_core::message::{Message, NewMessage};
use agentcanvas_core::store::{AgentCatalog, AgentStateStore, MessageStore};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

pub use agent_states::AgentStateFilter;
pub use conversations::ConversationFilter;

/// Offset pagination shared by every list operation.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
        }
    }
}

impl Page {
    pub fn new(skip: usize, limit: usize) -> Self {
        Self { skip, limit }
    }
}

/// SQLite-backed relational store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Database(format!("Invalid SQLite url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every connection to ":memory:" is a separate database.
        let max_connections = if url.contains(":memory:") { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("Relational store initialized at {url}");
        Ok(store)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        schema::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap liveness probe.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(rows::db("ping"))?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        self.append_message(message).await
    }

    async fn list_recent(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>, StoreError> {
        self.list_recent_messages(conversation_id, limit).await
    }
}

#[async_trait]
impl AgentCatalog for SqliteStore {
    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError> {
        self.find_agent(id).await
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        self.find_conversation(id).await
    }

    async fn team_members(&self, team_id: Uuid) -> Result<Vec<TeamMember>, StoreError> {
        self.list_team_members(team_id).await
    }
}

#[async_trait]
impl AgentStateStore for SqliteStore {
    async fn upsert_agent_state(&self, state: AgentStateUpsert) -> Result<AgentState, StoreError> {
        self.upsert_state(state).await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn open_runs_migrations_idempotently() {
        let store = store().await;
        schema::run_migrations(store.pool()).await.unwrap();
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn store_traits_delegate_to_crud() {
        let store = store().await;
        let agent = agent(&store, "Planner").await;
        let conv = conversation(&store).await;

        let catalog: &dyn AgentCatalog = &store;
        assert_eq!(catalog.get_agent(agent.id).await.unwrap().unwrap().name, "Planner");
        assert!(catalog.get_agent(Uuid::new_v4()).await.unwrap().is_none());

        let messages: &dyn MessageStore = &store;
        messages.append(NewMessage::user(conv.id, "hi")).await.unwrap();
        assert_eq!(messages.list_recent(conv.id, 10).await.unwrap().len(), 1);
    }

    #[test]
    fn page_defaults_from_empty_query() {
        let page: Page = serde_json::from_str("{}").unwrap();
        assert_eq!(page.skip, 0);
        assert_eq!(page.limit, 100);
    }
}
