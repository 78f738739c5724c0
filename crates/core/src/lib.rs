//! # AgentCanvas Core
//!
//! Domain types, traits, and error definitions for the AgentCanvas
//! orchestration backend. Nothing in here talks to a database, a model, or
//! the network; it only defines the contracts the other crates implement.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the agent graph is a trait here:
//! - [`MessageStore`], [`AgentCatalog`], [`AgentStateStore`] for relational persistence
//! - [`MemoryStore`] for the knowledge-graph backed long-term memory
//! - [`Provider`] for the reasoning model behind an agent turn
//! - [`Tool`] for capabilities an agent can invoke
//!
//! Implementations live in their own crates, so tests can swap any of them
//! for a scripted fake.

pub mod error;
pub mod message;
pub mod entity;
pub mod memory;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result, RunError, RunSnapshot};
pub use message::{ChatMessage, Message, NewMessage, Role};
pub use entity::{Agent, AgentProfile, AgentState, Conversation, EvaluationResult, Team, TeamMember};
pub use memory::{MemoryHandle, MemoryHit, MemoryStore, MemorySubject, WriteMode};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use store::{AgentCatalog, AgentStateStore, MessageStore};
pub use tool::{Tool, ToolCall, ToolContext, ToolRegistry, ToolResult};
