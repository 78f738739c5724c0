//! No-op memory backend: disables long-term memory entirely.

use async_trait::async_trait;
use agentcanvas_core::error::MemoryError;
use agentcanvas_core::memory::{MemoryHit, MemoryStore, MemorySubject};

/// A memory backend that stores nothing and recalls nothing.
pub struct NoopMemory;

#[async_trait]
impl MemoryStore for NoopMemory {
    fn name(&self) -> &str { "none" }

    async fn add(
        &self,
        _text: &str,
        _subject: &MemorySubject,
        _metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, MemoryError> {
        Ok(String::new())
    }

    async fn search(
        &self,
        _query: &str,
        _subject: &MemorySubject,
        _limit: usize,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        Ok(Vec::new())
    }
}
