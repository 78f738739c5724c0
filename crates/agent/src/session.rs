//! The Session Service: one user utterance in, one assistant reply out.
//!
//! It composes the initial state from stored history, drives the graph,
//! then persists everything the run produced in emission order. Message
//! persistence happens here and nowhere else.

use agentcanvas_config::{AppConfig, MemoryScope};
use agentcanvas_core::entity::AgentStateUpsert;
use agentcanvas_core::error::{Result, RunError};
use agentcanvas_core::memory::{MemoryHandle, MemoryStore, MemorySubject, WriteMode};
use agentcanvas_core::message::{ChatMessage, Message, Role};
use agentcanvas_core::store::{AgentStateStore, MessageStore};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::graph::{Graph, RunContext};
use crate::resolver::AgentResolver;
use crate::state::ExecutionState;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Stored messages loaded as context
    pub history_window: usize,
    pub scope: MemoryScope,
    pub write_mode: WriteMode,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            history_window: config.graph.history_window,
            scope: config.memory.scope,
            write_mode: if config.memory.detached_writes {
                WriteMode::Detached
            } else {
                WriteMode::Inline
            },
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// The new user message of a turn.
#[derive(Debug, Clone, Default)]
pub struct UserUtterance {
    pub content: String,
    /// Set when the request path already stored this message
    pub persisted_id: Option<Uuid>,
    pub user_id: Option<String>,
    /// Overrides the resolver for this turn
    pub agent_id: Option<Uuid>,
}

impl UserUtterance {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn persisted_as(mut self, id: Uuid) -> Self {
        self.persisted_id = Some(id);
        self
    }

    pub fn from_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn for_agent(mut self, agent_id: Uuid) -> Self {
        self.agent_id = Some(agent_id);
        self
    }
}

/// A message of the run's tail that could not be stored.
#[derive(Debug, Clone, Serialize)]
pub struct PersistenceFailure {
    /// Index within the run's new messages
    pub position: usize,
    pub role: Role,
    pub reason: String,
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub conversation_id: Uuid,
    /// Agent that produced the reply
    pub agent_id: Option<Uuid>,
    /// Content of the last assistant message of the run
    pub content: String,
    /// The stored row of that message, if it was stored
    pub message: Option<Message>,
    /// Every row written for this run, in emission order
    pub persisted: Vec<Message>,
    pub failures: Vec<PersistenceFailure>,
    pub steps: usize,
}

impl TurnOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Extra rows fetched past the history window to find the assistant
/// message owning a tool batch at the window's edge.
const TOOL_BATCH_LOOKBACK: usize = 16;

pub struct SessionService {
    graph: Arc<Graph>,
    messages: Arc<dyn MessageStore>,
    states: Arc<dyn AgentStateStore>,
    memory: Arc<dyn MemoryStore>,
    resolver: Arc<dyn AgentResolver>,
    settings: SessionSettings,
}

impl SessionService {
    pub fn new(
        graph: Arc<Graph>,
        messages: Arc<dyn MessageStore>,
        states: Arc<dyn AgentStateStore>,
        memory: Arc<dyn MemoryStore>,
        resolver: Arc<dyn AgentResolver>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            graph,
            messages,
            states,
            memory,
            resolver,
            settings,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    fn subject(&self, conversation_id: Uuid, user_id: Option<&str>) -> MemorySubject {
        match (self.settings.scope, user_id) {
            (MemoryScope::User, Some(user)) => MemorySubject::user(user),
            _ => MemorySubject::conversation(conversation_id),
        }
    }

    /// Stored history, oldest first, without the utterance itself.
    ///
    /// A tool batch cut by the window is widened back to the assistant
    /// message that requested it; tool rows and tool calls still left
    /// without their counterpart are dropped.
    async fn load_history(&self, conversation_id: Uuid, exclude: Option<Uuid>) -> Result<Vec<ChatMessage>> {
        let window = self.settings.history_window;
        let fetch = window + usize::from(exclude.is_some()) + TOOL_BATCH_LOOKBACK;
        let mut stored = self.messages.list_recent(conversation_id, fetch).await?;
        stored.retain(|m| Some(m.id) != exclude);

        let mut start = stored.len().saturating_sub(window);
        while start > 0 && stored[start].role == Role::Tool {
            start -= 1;
        }
        let history: Vec<ChatMessage> = stored[start..].iter().map(ChatMessage::from_stored).collect();
        Ok(pair_tool_messages(conversation_id, history))
    }

    /// Run one conversation turn for a new user utterance.
    ///
    /// Fails only with run-level errors or when history cannot be loaded.
    /// Per-message persistence failures are reported on the outcome.
    pub async fn run_conversation_turn(
        &self,
        conversation_id: Uuid,
        utterance: UserUtterance,
    ) -> Result<TurnOutcome> {
        let started = Instant::now();
        let memory = MemoryHandle::new(
            Arc::clone(&self.memory),
            self.subject(conversation_id, utterance.user_id.as_deref()),
        )
        .with_write_mode(self.settings.write_mode);

        let mut working = self.load_history(conversation_id, utterance.persisted_id).await?;
        working.push(ChatMessage::user(&utterance.content));
        let seeded = working.len();

        let mut metadata = base_metadata(conversation_id, utterance.persisted_id, "user");
        if let Some(user_id) = &utterance.user_id {
            metadata.insert("user_id".into(), json!(user_id));
        }
        memory.record(utterance.content.clone(), metadata).await;

        let agent_id = match utterance.agent_id {
            Some(id) => id,
            None => self
                .resolver
                .resolve(conversation_id)
                .await?
                .ok_or(RunError::NoInitialAgent { conversation_id })?,
        };

        info!(
            %conversation_id,
            %agent_id,
            history = seeded - 1,
            memory_subject = %memory.subject(),
            "Starting conversation turn"
        );

        let ctx = RunContext {
            conversation_id,
            memory: memory.clone(),
        };
        let mut execution = self.graph.start(ExecutionState::new(working, agent_id), ctx);
        while let Some(step) = execution.next_step().await {
            match step {
                Ok(event) => debug!(
                    %conversation_id,
                    step = event.step,
                    node = %event.node,
                    new_messages = event.delta.messages.len(),
                    "Step completed"
                ),
                Err(e) => {
                    warn!(%conversation_id, kind = e.kind(), "Run failed: {e}");
                    return Err(e);
                }
            }
        }
        let steps = execution.steps();
        let state = execution.into_state();

        let mut persisted = Vec::new();
        let mut failures = Vec::new();
        let mut last_reply: Option<(String, Option<Uuid>, Option<Message>)> = None;

        for (position, message) in state.messages.iter().enumerate().skip(seeded) {
            let position = position - seeded;
            if let ChatMessage::User { .. } = message {
                continue;
            }

            let stored = match self.messages.append(message.to_new_message(conversation_id)).await {
                Ok(row) => {
                    persisted.push(row.clone());
                    Some(row)
                }
                Err(e) => {
                    warn!(
                        %conversation_id,
                        position,
                        role = %message.role(),
                        kind = "PersistenceFailure",
                        "Failed to persist message: {e}"
                    );
                    failures.push(PersistenceFailure {
                        position,
                        role: message.role(),
                        reason: e.to_string(),
                    });
                    None
                }
            };
            let stored_id = stored.as_ref().map(|m| m.id);

            match message {
                ChatMessage::User { .. } | ChatMessage::System { .. } => {}
                ChatMessage::Assistant { content, agent_id, .. } => {
                    if !content.is_empty() {
                        let mut metadata = base_metadata(conversation_id, stored_id, "agent");
                        if let Some(agent_id) = agent_id {
                            metadata.insert("agent_id".into(), json!(agent_id));
                        }
                        memory.record(content.clone(), metadata).await;
                    }
                    last_reply = Some((content.clone(), *agent_id, stored));
                }
                ChatMessage::Tool {
                    tool_call_id,
                    content,
                    ..
                } => {
                    let mut metadata = base_metadata(conversation_id, stored_id, "tool");
                    metadata.insert("tool_call_id".into(), json!(tool_call_id));
                    memory
                        .record(format!("Tool Result ({tool_call_id}): {content}"), metadata)
                        .await;
                }
            }
        }

        let Some((content, reply_agent, message)) = last_reply else {
            warn!(%conversation_id, kind = "NoFinalResponse", "Run produced no assistant message");
            return Err(RunError::NoFinalResponse { conversation_id }.into());
        };

        if let Some(active) = state.active_agent_id {
            let snapshot = AgentStateUpsert {
                conversation_id,
                agent_id: active,
                state_data: json!({
                    "steps": steps,
                    "message_count": state.messages.len(),
                    "last_node": state.next_node.as_ref().map(|n| n.to_string()),
                })
                .as_object()
                .cloned()
                .unwrap_or_default(),
                version: None,
            };
            if let Err(e) = self.states.upsert_agent_state(snapshot).await {
                warn!(%conversation_id, agent_id = %active, kind = "PersistenceFailure", "Failed to store agent state: {e}");
            }
        }

        info!(
            %conversation_id,
            steps,
            persisted = persisted.len(),
            failed = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Conversation turn finished"
        );

        Ok(TurnOutcome {
            conversation_id,
            agent_id: reply_agent,
            content,
            message,
            persisted,
            failures,
            steps,
        })
    }
}

fn base_metadata(conversation_id: Uuid, message_id: Option<Uuid>, sender_type: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("conversation_id".into(), json!(conversation_id));
    metadata.insert("sender_type".into(), json!(sender_type));
    if let Some(id) = message_id {
        metadata.insert("message_id".into(), json!(id));
    }
    metadata
}

/// Keep tool calls and tool results only where both halves are present.
///
/// Chat completion backends reject a tool message without a preceding
/// assistant call, and an assistant call without its results.
fn pair_tool_messages(conversation_id: Uuid, history: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let answered: HashSet<String> = history
        .iter()
        .filter_map(|m| match m {
            ChatMessage::Tool { tool_call_id, .. } => Some(tool_call_id.clone()),
            _ => None,
        })
        .collect();

    let mut requested = HashSet::new();
    let mut paired = Vec::with_capacity(history.len());
    for message in history {
        match message {
            ChatMessage::Assistant {
                content,
                agent_id,
                tool_calls,
            } => {
                let had_calls = !tool_calls.is_empty();
                let tool_calls: Vec<_> = tool_calls
                    .into_iter()
                    .filter(|call| answered.contains(&call.id))
                    .collect();
                requested.extend(tool_calls.iter().map(|call| call.id.clone()));
                if had_calls && tool_calls.is_empty() && content.is_empty() {
                    debug!(%conversation_id, "Dropping assistant tool request without stored results");
                    continue;
                }
                paired.push(ChatMessage::Assistant {
                    content,
                    agent_id,
                    tool_calls,
                });
            }
            ChatMessage::Tool { ref tool_call_id, .. } if !requested.contains(tool_call_id) => {
                debug!(%conversation_id, %tool_call_id, "Dropping tool result without its request");
            }
            other => paired.push(other),
        }
    }
    paired
}
