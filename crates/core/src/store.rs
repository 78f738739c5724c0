//! Store traits: the slice of the relational layer the agent graph uses.
//!
//! The full CRUD surface lives on the concrete store in `agentcanvas-store`;
//! the Session Service and Turn Executor only depend on these traits.

use async_trait::async_trait;
use uuid::Uuid;

use crate::entity::{Agent, AgentState, AgentStateUpsert, Conversation, TeamMember};
use crate::error::StoreError;
use crate::message::{Message, NewMessage};

/// Ordered persistence of conversation messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message, assigning its id and creation timestamp.
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// The most recent `limit` messages of a conversation, oldest first.
    async fn list_recent(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>, StoreError>;
}

/// Read access to agents and the conversations they serve.
#[async_trait]
pub trait AgentCatalog: Send + Sync {
    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError>;

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    /// Members of a team in the order they joined.
    async fn team_members(&self, team_id: Uuid) -> Result<Vec<TeamMember>, StoreError>;
}

/// Upsert of per-(conversation, agent) state snapshots.
#[async_trait]
pub trait AgentStateStore: Send + Sync {
    async fn upsert_agent_state(&self, state: AgentStateUpsert) -> Result<AgentState, StoreError>;
}
