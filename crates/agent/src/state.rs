//! Execution state and the merge rule that threads it through a run.
//!
//! The state is plain data. Everything stateful a node needs (the memory
//! session, the conversation id) travels in [`RunContext`](crate::graph::RunContext)
//! instead, so a state can be cloned, snapshotted and compared freely.

use agentcanvas_core::error::RunSnapshot;
use agentcanvas_core::message::ChatMessage;
use agentcanvas_core::tool::ToolCall;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::NodeId;

/// The run-scoped record every node reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Append-only within a run.
    pub messages: Vec<ChatMessage>,
    /// The agent whose turn is next. Only agent turns change it.
    pub active_agent_id: Option<Uuid>,
    /// Set by an agent turn, cleared by the tool turn.
    pub pending_tool_calls: Vec<ToolCall>,
    pub next_node: Option<NodeId>,
}

impl ExecutionState {
    pub fn new(messages: Vec<ChatMessage>, active_agent_id: Uuid) -> Self {
        Self {
            messages,
            active_agent_id: Some(active_agent_id),
            pending_tool_calls: Vec::new(),
            next_node: None,
        }
    }

    pub fn snapshot(&self, steps: usize) -> RunSnapshot {
        RunSnapshot {
            steps,
            messages: self.messages.clone(),
            active_agent_id: self.active_agent_id,
            pending_tool_calls: self.pending_tool_calls.clone(),
            next_node: self.next_node.as_ref().map(|n| n.to_string()),
        }
    }
}

/// What one node returns: new messages plus the fields it wants replaced.
///
/// `None` means "leave the prior value alone".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub messages: Vec<ChatMessage>,
    pub active_agent_id: Option<Uuid>,
    pub pending_tool_calls: Option<Vec<ToolCall>>,
    pub next_node: Option<NodeId>,
}

impl StateDelta {
    pub fn route(next: NodeId) -> Self {
        Self {
            next_node: Some(next),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.active_agent_id.is_none()
            && self.pending_tool_calls.is_none()
            && self.next_node.is_none()
    }
}

/// Fold a delta into the prior state.
///
/// `messages` concatenate in emission order and are never reordered or
/// deduplicated; every other field is replaced when the delta carries it.
pub fn merge(mut prior: ExecutionState, delta: StateDelta) -> ExecutionState {
    prior.messages.extend(delta.messages);
    if let Some(agent_id) = delta.active_agent_id {
        prior.active_agent_id = Some(agent_id);
    }
    if let Some(calls) = delta.pending_tool_calls {
        prior.pending_tool_calls = calls;
    }
    if let Some(next) = delta.next_node {
        prior.next_node = Some(next);
    }
    prior
}
