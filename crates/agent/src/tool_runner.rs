//! The tool turn: execute every pending tool call and report back.

use agentcanvas_core::error::{Result, ToolError};
use agentcanvas_core::message::ChatMessage;
use agentcanvas_core::tool::{ToolCall, ToolContext, ToolRegistry};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::graph::{Node, NodeId, RunContext};
use crate::state::{ExecutionState, StateDelta};

pub struct ToolRunner {
    tools: Arc<ToolRegistry>,
}

impl ToolRunner {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    /// Run one call to completion. Never fails: every outcome is a tool message.
    async fn run_call(&self, call: &ToolCall, ctx: &ToolContext) -> ChatMessage {
        let outcome = AssertUnwindSafe(self.tools.execute(call, ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(ToolError::ExecutionFailed {
                    tool_name: call.name.clone(),
                    reason: "tool panicked".into(),
                })
            });

        match outcome {
            Ok(result) if result.success => {
                debug!(tool = %call.name, call_id = %call.id, "Tool succeeded");
                ChatMessage::tool_result(&call.id, result.output)
            }
            Ok(result) => {
                warn!(
                    conversation_id = %ctx.conversation_id,
                    tool = %call.name,
                    call_id = %call.id,
                    kind = "ToolExecutionFailure",
                    "Tool reported failure"
                );
                ChatMessage::tool_error(&call.id, format!("Error: {}", result.output))
            }
            Err(e) => {
                warn!(
                    conversation_id = %ctx.conversation_id,
                    tool = %call.name,
                    call_id = %call.id,
                    kind = "ToolExecutionFailure",
                    "Tool failed: {e}"
                );
                ChatMessage::tool_error(&call.id, format!("Error: {e}"))
            }
        }
    }
}

#[async_trait]
impl Node for ToolRunner {
    async fn execute(&self, state: &ExecutionState, ctx: &RunContext) -> Result<StateDelta> {
        if state.pending_tool_calls.is_empty() {
            return Ok(StateDelta::route(NodeId::AGENT_TURN));
        }

        let tool_ctx = ToolContext {
            conversation_id: ctx.conversation_id,
            agent_id: state.active_agent_id,
            memory: ctx.memory.clone(),
        };

        // Calls run concurrently; join_all keeps results in call order.
        let messages = join_all(
            state
                .pending_tool_calls
                .iter()
                .map(|call| self.run_call(call, &tool_ctx)),
        )
        .await;

        Ok(StateDelta {
            messages,
            pending_tool_calls: Some(Vec::new()),
            next_node: Some(NodeId::AGENT_TURN),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use uuid::Uuid;

    fn runner() -> ToolRunner {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(FailingTool));
        registry.register(Box::new(PanickingTool));
        ToolRunner::new(Arc::new(registry))
    }

    fn pending(calls: Vec<ToolCall>) -> ExecutionState {
        ExecutionState {
            pending_tool_calls: calls,
            ..ExecutionState::new(vec![ChatMessage::user("go")], Uuid::new_v4())
        }
    }

    fn tool_call_id(message: &ChatMessage) -> (&str, bool) {
        match message {
            ChatMessage::Tool {
                tool_call_id,
                is_error,
                ..
            } => (tool_call_id.as_str(), *is_error),
            other => panic!("expected tool message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop_back_to_agent() {
        let delta = runner()
            .execute(&pending(vec![]), &run_ctx(quiet_memory()))
            .await
            .unwrap();
        assert!(delta.messages.is_empty());
        assert_eq!(delta.next_node, Some(NodeId::AGENT_TURN));
        assert!(delta.pending_tool_calls.is_none());
    }

    #[tokio::test]
    async fn one_failure_does_not_drop_siblings() {
        let state = pending(vec![
            call("call_a", "flaky", serde_json::json!({})),
            call("call_b", "echo", serde_json::json!({"text": "pong"})),
        ]);
        let delta = runner().execute(&state, &run_ctx(quiet_memory())).await.unwrap();

        assert_eq!(delta.messages.len(), 2);
        assert_eq!(tool_call_id(&delta.messages[0]), ("call_a", true));
        assert!(delta.messages[0].content().starts_with("Error: "));
        assert_eq!(tool_call_id(&delta.messages[1]), ("call_b", false));
        assert_eq!(delta.messages[1].content(), "pong");

        assert_eq!(delta.pending_tool_calls, Some(vec![]));
        assert_eq!(delta.next_node, Some(NodeId::AGENT_TURN));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_message() {
        let state = pending(vec![call("call_x", "teleport", serde_json::json!({}))]);
        let delta = runner().execute(&state, &run_ctx(quiet_memory())).await.unwrap();
        assert_eq!(tool_call_id(&delta.messages[0]), ("call_x", true));
        assert!(delta.messages[0].content().contains("teleport"));
    }

    #[tokio::test]
    async fn panicking_tool_is_contained() {
        let state = pending(vec![
            call("call_p", "panic", serde_json::json!({})),
            call("call_e", "echo", serde_json::json!({"text": "still fine"})),
        ]);
        let delta = runner().execute(&state, &run_ctx(quiet_memory())).await.unwrap();
        assert_eq!(delta.messages.len(), 2);
        assert_eq!(tool_call_id(&delta.messages[0]), ("call_p", true));
        assert_eq!(delta.messages[1].content(), "still fine");
    }

    #[tokio::test]
    async fn reported_failure_is_an_error_message() {
        let state = pending(vec![call("call_s", "echo", serde_json::json!({"text": "", "fail": true}))]);
        let delta = runner().execute(&state, &run_ctx(quiet_memory())).await.unwrap();
        assert_eq!(tool_call_id(&delta.messages[0]), ("call_s", true));
    }
}
