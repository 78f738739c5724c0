//! Message domain types.
//!
//! Two shapes of the same thing:
//! - [`ChatMessage`] is what flows through the agent graph. It is a tagged
//!   variant so every consumer has to match on the role exhaustively.
//! - [`Message`] is the persisted row owned by the relational store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolCall;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// An agent speaking in the conversation
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "tool" => Ok(Role::Tool),
            other => Err(format!("unknown message role '{other}'")),
        }
    }
}

/// A message inside a graph run, carrying role-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    User {
        content: String,
    },
    Assistant {
        content: String,
        /// The agent that produced this message
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<Uuid>,
        /// Tool invocations requested by the agent
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    System {
        content: String,
    },
    Tool {
        /// The call this message answers
        tool_call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User {
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage::Assistant {
            content: content.into(),
            agent_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn tool_error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            ChatMessage::User { .. } => Role::User,
            ChatMessage::Assistant { .. } => Role::Assistant,
            ChatMessage::System { .. } => Role::System,
            ChatMessage::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ChatMessage::User { content }
            | ChatMessage::Assistant { content, .. }
            | ChatMessage::System { content }
            | ChatMessage::Tool { content, .. } => content,
        }
    }

    /// Rebuild the execution shape of a stored row.
    pub fn from_stored(message: &Message) -> Self {
        match message.role {
            Role::User => ChatMessage::user(&message.content),
            Role::System => ChatMessage::system(&message.content),
            Role::Assistant => ChatMessage::Assistant {
                content: message.content.clone(),
                agent_id: message.agent_id,
                tool_calls: message.tool_calls.clone().unwrap_or_default(),
            },
            Role::Tool => ChatMessage::Tool {
                tool_call_id: message.tool_call_id.clone().unwrap_or_default(),
                content: message.content.clone(),
                is_error: message
                    .metadata
                    .get("is_error")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            },
        }
    }

    /// Build the create payload for persisting this message.
    pub fn to_new_message(&self, conversation_id: Uuid) -> NewMessage {
        let mut new = NewMessage {
            conversation_id,
            agent_id: None,
            role: self.role(),
            content: self.content().to_string(),
            tool_calls: None,
            tool_call_id: None,
            metadata: serde_json::Map::new(),
        };
        match self {
            ChatMessage::User { .. } | ChatMessage::System { .. } => {}
            ChatMessage::Assistant {
                agent_id,
                tool_calls,
                ..
            } => {
                new.agent_id = *agent_id;
                if !tool_calls.is_empty() {
                    new.tool_calls = Some(tool_calls.clone());
                }
            }
            ChatMessage::Tool {
                tool_call_id,
                is_error,
                ..
            } => {
                new.tool_call_id = Some(tool_call_id.clone());
                if *is_error {
                    new.metadata
                        .insert("is_error".into(), serde_json::Value::Bool(true));
                }
            }
        }
        new
    }
}

/// A persisted conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,

    pub role: Role,
    pub content: String,

    /// Tool calls requested by an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// For tool messages, the call this answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

/// Payload for appending a message to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: Uuid,

    #[serde(default)]
    pub agent_id: Option<Uuid>,

    pub role: Role,
    pub content: String,

    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,

    #[serde(default)]
    pub tool_call_id: Option<String>,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl NewMessage {
    pub fn user(conversation_id: Uuid, content: impl Into<String>) -> Self {
        ChatMessage::user(content).to_new_message(conversation_id)
    }
}
