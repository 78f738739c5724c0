//! The agent turn: one call to the reasoning model as the active agent.

use agentcanvas_config::AppConfig;
use agentcanvas_core::entity::Agent;
use agentcanvas_core::error::{Error, Result, RunError};
use agentcanvas_core::memory::MemoryHit;
use agentcanvas_core::message::ChatMessage;
use agentcanvas_core::provider::{Provider, ProviderRequest};
use agentcanvas_core::store::AgentCatalog;
use agentcanvas_core::tool::ToolRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::graph::{Node, NodeId, RunContext};
use crate::state::{ExecutionState, StateDelta};

pub use agentcanvas_config::ToolRoutingMode as ToolRouting;

/// Defaults applied when an agent's config does not override them.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_tokens: Option<u32>,
    /// Memories recalled into the system prompt; 0 disables recall
    pub recall_limit: usize,
    pub tool_routing: ToolRouting,
}

impl TurnConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_model: config.default_model.clone(),
            default_temperature: config.default_temperature,
            default_max_tokens: config.default_max_tokens,
            recall_limit: config.memory.recall_limit,
            tool_routing: config.graph.tool_routing,
        }
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Runs the active agent against the accumulated conversation.
pub struct TurnExecutor {
    catalog: Arc<dyn AgentCatalog>,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    config: TurnConfig,
}

impl TurnExecutor {
    pub fn new(
        catalog: Arc<dyn AgentCatalog>,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        config: TurnConfig,
    ) -> Self {
        Self {
            catalog,
            provider,
            tools,
            config,
        }
    }

    /// Recall memories relevant to the latest user message.
    ///
    /// A failing memory store degrades to an empty recall.
    async fn recall(&self, state: &ExecutionState, ctx: &RunContext) -> Vec<MemoryHit> {
        if self.config.recall_limit == 0 {
            return vec![];
        }
        let query = state.messages.iter().rev().find_map(|m| match m {
            ChatMessage::User { content } => Some(content.as_str()),
            _ => None,
        });
        let Some(query) = query else {
            return vec![];
        };

        match ctx.memory.search(query, self.config.recall_limit).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(
                    conversation_id = %ctx.conversation_id,
                    subject = %ctx.memory.subject(),
                    kind = "MemoryReadFailure",
                    "Memory recall failed, continuing without it: {e}"
                );
                vec![]
            }
        }
    }
}

fn system_prompt(agent: &Agent, memories: &[MemoryHit]) -> String {
    let mut prompt = match agent.system_prompt.as_deref() {
        Some(p) if !p.trim().is_empty() => p.to_string(),
        _ => format!("You are {}, a helpful assistant.", agent.name),
    };

    if !memories.is_empty() {
        prompt.push_str("\n\n## Relevant memories\n");
        for hit in memories {
            prompt.push_str("- ");
            prompt.push_str(&hit.text);
            prompt.push('\n');
        }
    }
    prompt
}

#[async_trait]
impl Node for TurnExecutor {
    async fn execute(&self, state: &ExecutionState, ctx: &RunContext) -> Result<StateDelta> {
        let agent_id = state
            .active_agent_id
            .ok_or_else(|| Error::Internal("agent turn started without an active agent".into()))?;

        let agent = self
            .catalog
            .get_agent(agent_id)
            .await?
            .ok_or(RunError::AgentNotFound { agent_id })?;
        let profile = agent.profile();

        let memories = self.recall(state, ctx).await;

        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(ChatMessage::system(system_prompt(&agent, &memories)));
        messages.extend(state.messages.iter().cloned());

        let request = ProviderRequest {
            model: profile.model.unwrap_or_else(|| self.config.default_model.clone()),
            messages,
            temperature: profile.temperature.unwrap_or(self.config.default_temperature),
            max_tokens: profile.max_tokens.or(self.config.default_max_tokens),
            tools: self.tools.definitions_for(profile.tools.as_deref()),
            agent_name: Some(agent.name.clone()),
        };

        debug!(
            conversation_id = %ctx.conversation_id,
            agent_id = %agent_id,
            provider = self.provider.name(),
            model = %request.model,
            recalled = memories.len(),
            "Calling agent"
        );

        let response = self.provider.complete(request).await?;

        let next = match self.config.tool_routing {
            ToolRouting::Always => NodeId::TOOL_TURN,
            ToolRouting::Conditional if response.tool_calls.is_empty() => NodeId::END,
            ToolRouting::Conditional => NodeId::TOOL_TURN,
        };

        Ok(StateDelta {
            messages: vec![ChatMessage::Assistant {
                content: response.content,
                agent_id: Some(agent_id),
                tool_calls: response.tool_calls.clone(),
            }],
            active_agent_id: Some(agent_id),
            pending_tool_calls: Some(response.tool_calls),
            next_node: Some(next),
        })
    }
}
