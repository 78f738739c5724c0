//! Error types for the AgentCanvas domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Only [`RunError`] kinds and infrastructure failures ever surface from a
//! conversation turn. Tool failures, memory failures and per-message
//! persistence failures are absorbed by the agent graph and turned into data.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::message::ChatMessage;
use crate::tool::ToolCall;

/// The top-level error type for all AgentCanvas operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Orchestration ---
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Relational store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable, machine-readable name of the failure kind.
    ///
    /// This is what the wire boundary reports; it never contains
    /// internal error text.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Run(run) => run.kind(),
            Error::Provider(_) => "ProviderFailure",
            Error::Memory(_) => "MemoryFailure",
            Error::Tool(_) => "ToolExecutionFailure",
            Error::Store(StoreError::NotFound { .. }) => "NotFound",
            Error::Store(_) => "PersistenceFailure",
            Error::Config { .. } => "ConfigurationError",
            Error::Serialization(_) => "SerializationError",
            Error::Internal(_) => "InternalError",
        }
    }

    /// A short human-readable summary that is safe to show to callers.
    pub fn summary(&self) -> String {
        match self {
            Error::Run(RunError::AgentNotFound { .. }) => {
                "The requested agent does not exist".into()
            }
            Error::Run(RunError::NoInitialAgent { .. }) => {
                "No agent is assigned to this conversation".into()
            }
            Error::Run(RunError::RecursionLimitExceeded { limit, .. }) => {
                format!("The agent loop did not finish within {limit} steps")
            }
            Error::Run(RunError::NoFinalResponse { .. }) => {
                "The run finished without an assistant response".into()
            }
            Error::Run(RunError::UnknownNode(_)) => "The agent graph is misconfigured".into(),
            Error::Provider(_) => "The reasoning model could not produce a response".into(),
            Error::Memory(_) => "The memory store is unavailable".into(),
            Error::Tool(_) => "A tool invocation failed".into(),
            Error::Store(StoreError::NotFound { entity, .. }) => format!("{entity} not found"),
            Error::Store(_) => "The conversation store is unavailable".into(),
            Error::Config { .. } => "The service is misconfigured".into(),
            Error::Serialization(_) | Error::Internal(_) => "Internal server error".into(),
        }
    }
}

// --- Bounded context errors ---

/// Failures that make a coherent terminal state of a run unreachable.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: Uuid },

    /// Neither the request, the conversation's team nor the configuration names an agent.
    #[error("No agent available for conversation {conversation_id}")]
    NoInitialAgent { conversation_id: Uuid },

    #[error("Recursion limit of {limit} steps exceeded")]
    RecursionLimitExceeded {
        limit: usize,
        snapshot: Box<RunSnapshot>,
    },

    #[error("Run for conversation {conversation_id} produced no assistant response")]
    NoFinalResponse { conversation_id: Uuid },

    #[error("Graph routed to unknown node '{0}'")]
    UnknownNode(String),
}

impl RunError {
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::AgentNotFound { .. } => "AgentNotFound",
            RunError::NoInitialAgent { .. } => "NoInitialAgent",
            RunError::RecursionLimitExceeded { .. } => "RecursionLimitExceeded",
            RunError::NoFinalResponse { .. } => "NoFinalResponse",
            RunError::UnknownNode(_) => "UnknownNode",
        }
    }
}

/// Plain-data copy of the execution state at the moment a run was aborted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub steps: usize,
    pub messages: Vec<ChatMessage>,
    pub active_agent_id: Option<Uuid>,
    pub pending_tool_calls: Vec<ToolCall>,
    pub next_node: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Entity extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}
