//! Scripted fakes shared by the unit tests of this crate.

use agentcanvas_core::entity::{Agent, AgentState, AgentStateUpsert, Conversation, TeamMember};
use agentcanvas_core::error::{MemoryError, ProviderError, StoreError, ToolError};
use agentcanvas_core::memory::{MemoryHandle, MemoryHit, MemoryStore, MemorySubject, WriteMode};
use agentcanvas_core::message::{ChatMessage, Message, NewMessage};
use agentcanvas_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use agentcanvas_core::store::{AgentCatalog, AgentStateStore, MessageStore};
use agentcanvas_core::tool::{Tool, ToolCall, ToolContext, ToolResult};
use agentcanvas_memory::NoopMemory;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::graph::RunContext;

/// A provider that returns scripted responses in order.
///
/// Panics when the script runs out, unless told to repeat the last one.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    repeat_last: AtomicBool,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            repeat_last: AtomicBool::new(false),
        }
    }

    pub fn repeat_last(&self) {
        self.repeat_last.store(true, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();
        requests.push(request);

        match responses.get(index) {
            Some(response) => Ok(response.clone()),
            None if self.repeat_last.load(Ordering::SeqCst) && !responses.is_empty() => {
                Ok(responses[responses.len() - 1].clone())
            }
            None => panic!(
                "SequentialMockProvider: no more responses (call #{index}, have {})",
                responses.len()
            ),
        }
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.into(),
        tool_calls: vec![],
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn tool_response(calls: Vec<ToolCall>) -> ProviderResponse {
    ProviderResponse {
        tool_calls: calls,
        ..text_response("")
    }
}

pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

/// In-memory relational fake implementing every store trait the graph uses.
#[derive(Default)]
pub struct FakeStore {
    agents: Mutex<HashMap<Uuid, Agent>>,
    conversations: Mutex<HashMap<Uuid, Conversation>>,
    members: Mutex<HashMap<Uuid, Vec<TeamMember>>>,
    messages: Mutex<Vec<Message>>,
    states: Mutex<Vec<AgentState>>,
    appends: Mutex<usize>,
    failing_appends: Mutex<HashSet<usize>>,
}

impl FakeStore {
    pub fn add_agent(&self, name: &str, system_prompt: Option<&str>) -> Uuid {
        let id = self.add_agent_with_config(name, serde_json::json!({}));
        if let Some(agent) = self.agents.lock().unwrap().get_mut(&id) {
            agent.system_prompt = system_prompt.map(str::to_string);
        }
        id
    }

    pub fn add_agent_with_config(&self, name: &str, config: serde_json::Value) -> Uuid {
        let id = Uuid::new_v4();
        self.agents.lock().unwrap().insert(
            id,
            Agent {
                id,
                name: name.into(),
                description: None,
                system_prompt: None,
                config: config.as_object().cloned().unwrap_or_default(),
                created_at: Utc::now(),
                updated_at: None,
            },
        );
        id
    }

    pub fn add_team(&self, agents: &[Uuid]) -> Uuid {
        let team_id = Uuid::new_v4();
        let members = agents
            .iter()
            .map(|agent_id| TeamMember {
                team_id,
                agent_id: *agent_id,
                role: None,
                joined_at: Utc::now(),
            })
            .collect();
        self.members.lock().unwrap().insert(team_id, members);
        team_id
    }

    pub fn add_conversation(&self, team_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.conversations.lock().unwrap().insert(
            id,
            Conversation {
                id,
                team_id,
                user_id: None,
                title: None,
                metadata: Default::default(),
                created_at: Utc::now(),
                updated_at: None,
            },
        );
        id
    }

    /// Store a message directly, outside the append counter.
    pub fn seed_message(&self, conversation_id: Uuid, message: ChatMessage) -> Uuid {
        let row = to_row(message.to_new_message(conversation_id));
        let id = row.id;
        self.messages.lock().unwrap().push(row);
        id
    }

    /// Make the `n`-th call to `append` (0-based) fail.
    pub fn fail_append(&self, n: usize) {
        self.failing_appends.lock().unwrap().insert(n);
    }

    pub fn messages_of(&self, conversation_id: Uuid) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn states(&self) -> Vec<AgentState> {
        self.states.lock().unwrap().clone()
    }
}

fn to_row(new: NewMessage) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id: new.conversation_id,
        agent_id: new.agent_id,
        role: new.role,
        content: new.content,
        tool_calls: new.tool_calls,
        tool_call_id: new.tool_call_id,
        metadata: new.metadata,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl MessageStore for FakeStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        let attempt = {
            let mut appends = self.appends.lock().unwrap();
            *appends += 1;
            *appends - 1
        };
        if self.failing_appends.lock().unwrap().contains(&attempt) {
            return Err(StoreError::Database("disk full".into()));
        }
        let row = to_row(message);
        self.messages.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list_recent(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>, StoreError> {
        let all = self.messages_of(conversation_id);
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }
}

#[async_trait]
impl AgentCatalog for FakeStore {
    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError> {
        Ok(self.agents.lock().unwrap().get(&id).cloned())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.lock().unwrap().get(&id).cloned())
    }

    async fn team_members(&self, team_id: Uuid) -> Result<Vec<TeamMember>, StoreError> {
        Ok(self.members.lock().unwrap().get(&team_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl AgentStateStore for FakeStore {
    async fn upsert_agent_state(&self, upsert: AgentStateUpsert) -> Result<AgentState, StoreError> {
        let mut states = self.states.lock().unwrap();
        states.retain(|s| !(s.conversation_id == upsert.conversation_id && s.agent_id == upsert.agent_id));
        let state = AgentState {
            id: Uuid::new_v4(),
            conversation_id: upsert.conversation_id,
            agent_id: upsert.agent_id,
            state_data: upsert.state_data,
            version: upsert.version,
            created_at: Utc::now(),
            updated_at: None,
        };
        states.push(state.clone());
        Ok(state)
    }
}

/// A memory store whose every operation fails.
pub struct FailingMemory;

#[async_trait]
impl MemoryStore for FailingMemory {
    fn name(&self) -> &str {
        "failing"
    }

    async fn add(
        &self,
        _text: &str,
        _subject: &MemorySubject,
        _metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, MemoryError> {
        Err(MemoryError::Storage("connection refused".into()))
    }

    async fn search(
        &self,
        _query: &str,
        _subject: &MemorySubject,
        _limit: usize,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        Err(MemoryError::QueryFailed("connection refused".into()))
    }
}

pub fn quiet_memory() -> MemoryHandle {
    MemoryHandle::new(Arc::new(NoopMemory), MemorySubject::new("conv_test")).with_write_mode(WriteMode::Inline)
}

pub fn failing_memory() -> MemoryHandle {
    MemoryHandle::new(Arc::new(FailingMemory), MemorySubject::new("conv_test")).with_write_mode(WriteMode::Inline)
}

pub fn run_ctx(memory: MemoryHandle) -> RunContext {
    RunContext {
        conversation_id: Uuid::new_v4(),
        memory,
    }
}

/// Echoes `text`; reports failure when `fail` is set.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echoes back the input"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }
    async fn execute(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let text = arguments["text"].as_str().unwrap_or_default();
        Ok(ToolResult {
            success: !arguments["fail"].as_bool().unwrap_or(false),
            output: text.to_string(),
            data: None,
        })
    }
}

pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "flaky"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _arguments: serde_json::Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "flaky".into(),
            reason: "upstream timed out".into(),
        })
    }
}

pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "panic"
    }
    fn description(&self) -> &str {
        "Panics"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _arguments: serde_json::Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        panic!("tool bug")
    }
}
