//! Initial agent resolution for a conversation turn.

use agentcanvas_core::error::Result;
use agentcanvas_core::store::AgentCatalog;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Picks the agent that takes the first turn of a run.
#[async_trait]
pub trait AgentResolver: Send + Sync {
    /// `None` when no agent can serve the conversation.
    async fn resolve(&self, conversation_id: Uuid) -> Result<Option<Uuid>>;
}

/// Always the same agent.
pub struct FixedAgentResolver(pub Uuid);

#[async_trait]
impl AgentResolver for FixedAgentResolver {
    async fn resolve(&self, _conversation_id: Uuid) -> Result<Option<Uuid>> {
        Ok(Some(self.0))
    }
}

/// The first member of the conversation's team, else a configured fallback.
pub struct ConversationTeamResolver {
    catalog: Arc<dyn AgentCatalog>,
    fallback: Option<Uuid>,
}

impl ConversationTeamResolver {
    pub fn new(catalog: Arc<dyn AgentCatalog>, fallback: Option<Uuid>) -> Self {
        Self { catalog, fallback }
    }
}

#[async_trait]
impl AgentResolver for ConversationTeamResolver {
    async fn resolve(&self, conversation_id: Uuid) -> Result<Option<Uuid>> {
        let team_id = self
            .catalog
            .get_conversation(conversation_id)
            .await?
            .and_then(|c| c.team_id);

        if let Some(team_id) = team_id {
            if let Some(first) = self.catalog.team_members(team_id).await?.first() {
                debug!(%conversation_id, %team_id, agent_id = %first.agent_id, "Resolved agent from team");
                return Ok(Some(first.agent_id));
            }
        }
        Ok(self.fallback)
    }
}
