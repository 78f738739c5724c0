//! Memory contract: long-term, subject-scoped knowledge.
//!
//! A [`MemoryStore`] keeps free-text memory items per subject (a user or a
//! conversation) and indexes the entities and relationships found in them.
//! Runs never talk to a store directly; they get a [`MemoryHandle`] that is
//! already bound to one subject and shared by reference for the whole run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use crate::error::MemoryError;

/// The identity under which memories are scoped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemorySubject(String);

impl MemorySubject {
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    /// `conv_{id}`
    pub fn conversation(conversation_id: Uuid) -> Self {
        Self(format!("conv_{conversation_id}"))
    }

    /// `user_{id}`
    pub fn user(user_id: &str) -> Self {
        Self(format!("user_{user_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MemorySubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub text: String,

    /// Relevance score, higher is better. Only comparable within one result set.
    pub score: f32,

    /// Entities linked to this memory in the knowledge graph
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,

    pub created_at: DateTime<Utc>,
}

/// The core MemoryStore trait.
///
/// Implementations: SQLite knowledge graph, in-memory graph, none (no-op).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory", "none").
    fn name(&self) -> &str;

    /// Store a memory item and index the facts found in it.
    async fn add(
        &self,
        text: &str,
        subject: &MemorySubject,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<String, MemoryError>;

    /// Search memories for one subject, best match first.
    async fn search(
        &self,
        query: &str,
        subject: &MemorySubject,
        limit: usize,
    ) -> std::result::Result<Vec<MemoryHit>, MemoryError>;
}

/// How [`MemoryHandle::record`] performs the write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Spawn the write and return immediately.
    #[default]
    Detached,
    /// Await the write before returning.
    Inline,
}

/// A memory session bound to one subject for the duration of a run.
#[derive(Clone)]
pub struct MemoryHandle {
    store: Arc<dyn MemoryStore>,
    subject: MemorySubject,
    write_mode: WriteMode,
}

impl MemoryHandle {
    pub fn new(store: Arc<dyn MemoryStore>, subject: MemorySubject) -> Self {
        Self {
            store,
            subject,
            write_mode: WriteMode::default(),
        }
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    pub fn subject(&self) -> &MemorySubject {
        &self.subject
    }

    pub fn backend(&self) -> &str {
        self.store.name()
    }

    pub async fn search(&self, query: &str, limit: usize) -> std::result::Result<Vec<MemoryHit>, MemoryError> {
        self.store.search(query, &self.subject, limit).await
    }

    /// Best-effort write. Failures are logged and never returned.
    pub async fn record(&self, text: String, metadata: serde_json::Map<String, serde_json::Value>) {
        match self.write_mode {
            WriteMode::Inline => write_logged(self.store.as_ref(), &self.subject, &text, metadata).await,
            WriteMode::Detached => {
                let store = Arc::clone(&self.store);
                let subject = self.subject.clone();
                tokio::spawn(async move {
                    write_logged(store.as_ref(), &subject, &text, metadata).await;
                });
            }
        }
    }
}

impl std::fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("backend", &self.store.name())
            .field("subject", &self.subject)
            .field("write_mode", &self.write_mode)
            .finish()
    }
}

async fn write_logged(
    store: &dyn MemoryStore,
    subject: &MemorySubject,
    text: &str,
    metadata: serde_json::Map<String, serde_json::Value>,
) {
    match store.add(text, subject, metadata).await {
        Ok(id) => debug!(subject = %subject, memory_id = %id, "Memory recorded"),
        Err(e) => warn!(subject = %subject, kind = "MemoryWriteFailure", "Memory write failed: {e}"),
    }
}
