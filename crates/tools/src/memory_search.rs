//! Memory search tool: lets an agent query its long-term memory on demand.
//!
//! Searches go through the run's [`MemoryHandle`](agentcanvas_core::memory::MemoryHandle),
//! so an agent only ever sees memories of the subject it is serving.

use async_trait::async_trait;
use agentcanvas_core::error::ToolError;
use agentcanvas_core::tool::{Tool, ToolContext, ToolResult};
use serde::Serialize;
use tracing::debug;

const DEFAULT_LIMIT: u64 = 5;
const MAX_LIMIT: u64 = 50;

pub struct MemorySearchTool;

#[derive(Debug, Serialize)]
struct MemoryResult {
    id: String,
    text: String,
    score: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    entities: Vec<String>,
    created_at: String,
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search your long-term memory for facts about the user, people, places and past \
         conversations. Use this when you need to recall something you were told before."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for, e.g. a name or a topic"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of memories to return (default 5)",
                    "default": DEFAULT_LIMIT
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let limit = arguments["limit"].as_u64().unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize;

        let hits = ctx
            .memory
            .search(query, limit)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        debug!(
            subject = %ctx.memory.subject(),
            hits = hits.len(),
            "memory_search for '{query}'"
        );

        if hits.is_empty() {
            return Ok(ToolResult::ok(format!("No memories found matching '{query}'.")));
        }

        let output = hits
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{}. {}", i + 1, h.text))
            .collect::<Vec<_>>()
            .join("\n");
        let data: Vec<MemoryResult> = hits
            .into_iter()
            .map(|h| MemoryResult {
                id: h.id,
                text: h.text,
                score: h.score,
                entities: h.entities,
                created_at: h.created_at.to_rfc3339(),
            })
            .collect();

        let data = serde_json::to_value(&data).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })?;
        Ok(ToolResult::ok(output).with_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcanvas_core::memory::{MemoryHandle, MemoryStore, MemorySubject};
    use agentcanvas_memory::InMemoryGraphMemory;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn ctx_with(facts: &[&str], subject: &str) -> ToolContext {
        let store = Arc::new(InMemoryGraphMemory::new());
        let subject = MemorySubject::new(subject);
        for fact in facts {
            store.add(fact, &subject, Default::default()).await.unwrap();
        }
        ToolContext {
            conversation_id: Uuid::new_v4(),
            agent_id: None,
            memory: MemoryHandle::new(store, subject),
        }
    }

    #[tokio::test]
    async fn finds_stored_fact() {
        let ctx = ctx_with(&["My name is Bob and I live in London."], "conv_1").await;
        let result = MemorySearchTool
            .execute(serde_json::json!({"query": "Where does Bob live?"}), &ctx)
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("London"));
        assert_eq!(result.data.unwrap().as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_hits_is_still_success() {
        let ctx = ctx_with(&[], "conv_2").await;
        let result = MemorySearchTool
            .execute(serde_json::json!({"query": "anything"}), &ctx)
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.starts_with("No memories found"));
    }

    #[tokio::test]
    async fn missing_query_is_invalid() {
        let ctx = ctx_with(&[], "conv_3").await;
        let err = MemorySearchTool.execute(serde_json::json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
