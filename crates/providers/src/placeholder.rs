//! Deterministic provider used when no model is configured.

use async_trait::async_trait;
use agentcanvas_core::error::ProviderError;
use agentcanvas_core::message::{ChatMessage, Role};
use agentcanvas_core::provider::{Provider, ProviderRequest, ProviderResponse};

/// Echoes the latest non-system message back, prefixed with the agent name.
///
/// Never requests tools, so a run against it always ends after one turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderProvider;

impl PlaceholderProvider {
    pub fn reply_for(request: &ProviderRequest) -> String {
        let last = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role() != Role::System)
            .map(ChatMessage::content)
            .unwrap_or_default();
        let name = request.agent_name.as_deref().unwrap_or("assistant");
        format!("Agent {name} responding to: {last}")
    }
}

#[async_trait]
impl Provider for PlaceholderProvider {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse::text(Self::reply_for(&request), "placeholder"))
    }
}
