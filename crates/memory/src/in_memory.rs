//! In-memory knowledge graph: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use agentcanvas_core::error::MemoryError;
use agentcanvas_core::memory::{MemoryHit, MemoryStore, MemorySubject};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::extract::{EntityExtractor, HeuristicExtractor, Relationship, entity_key};
use crate::rank::{RRF_K, mentions, query_terms, reciprocal_rank_fusion, words};

#[derive(Debug, Clone)]
struct StoredMemory {
    id: String,
    subject: MemorySubject,
    text: String,
    /// (key, display name)
    entities: Vec<(String, String)>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Edge {
    subject: MemorySubject,
    from: String,
    to: String,
    rel_type: String,
}

#[derive(Default)]
struct GraphData {
    memories: Vec<StoredMemory>,
    edges: Vec<Edge>,
}

/// A memory store that keeps its knowledge graph in process memory.
pub struct InMemoryGraphMemory {
    data: Arc<RwLock<GraphData>>,
    extractor: Arc<dyn EntityExtractor>,
}

impl InMemoryGraphMemory {
    pub fn new() -> Self {
        Self::with_extractor(Arc::new(HeuristicExtractor))
    }

    pub fn with_extractor(extractor: Arc<dyn EntityExtractor>) -> Self {
        Self {
            data: Arc::new(RwLock::new(GraphData::default())),
            extractor,
        }
    }

    /// Number of memory items across all subjects.
    pub async fn len(&self) -> usize {
        self.data.read().await.memories.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Relationships known for a subject, as (from, rel_type, to) keys.
    pub async fn relationships(&self, subject: &MemorySubject) -> Vec<(String, String, String)> {
        self.data
            .read()
            .await
            .edges
            .iter()
            .filter(|e| &e.subject == subject)
            .map(|e| (e.from.clone(), e.rel_type.clone(), e.to.clone()))
            .collect()
    }
}

impl Default for InMemoryGraphMemory {
    fn default() -> Self {
        Self::new()
    }
}

fn to_hit(memory: &StoredMemory) -> MemoryHit {
    MemoryHit {
        id: memory.id.clone(),
        text: memory.text.clone(),
        score: 0.0,
        entities: memory.entities.iter().map(|(_, name)| name.clone()).collect(),
        created_at: memory.created_at,
    }
}

#[async_trait]
impl MemoryStore for InMemoryGraphMemory {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add(
        &self,
        text: &str,
        subject: &MemorySubject,
        _metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, MemoryError> {
        let extraction = self.extractor.extract(text).await?;
        let id = Uuid::new_v4().to_string();

        let mut data = self.data.write().await;
        data.memories.push(StoredMemory {
            id: id.clone(),
            subject: subject.clone(),
            text: text.to_string(),
            entities: extraction
                .entities
                .iter()
                .map(|e| (e.key(), e.name.clone()))
                .collect(),
            created_at: Utc::now(),
        });

        for Relationship { from, to, rel_type } in extraction.relationships {
            let (from, to) = (entity_key(&from), entity_key(&to));
            let exists = data.edges.iter().any(|e| {
                &e.subject == subject && e.from == from && e.to == to && e.rel_type == rel_type
            });
            if !exists {
                data.edges.push(Edge {
                    subject: subject.clone(),
                    from,
                    to,
                    rel_type,
                });
            }
        }

        Ok(id)
    }

    async fn search(
        &self,
        query: &str,
        subject: &MemorySubject,
        limit: usize,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        let data = self.data.read().await;
        let scoped: Vec<&StoredMemory> =
            data.memories.iter().filter(|m| &m.subject == subject).collect();

        if query.trim().is_empty() {
            return Ok(scoped.iter().rev().take(limit).map(|m| to_hit(m)).collect());
        }

        // Keyword side: count matched terms, newest first on ties.
        let terms = query_terms(query);
        let mut keyword: Vec<(usize, usize, &StoredMemory)> = scoped
            .iter()
            .enumerate()
            .filter_map(|(pos, m)| {
                let text_words: HashSet<String> = words(&m.text).into_iter().collect();
                let matched = terms.iter().filter(|t| text_words.contains(*t)).count();
                (matched > 0).then_some((matched, pos, *m))
            })
            .collect();
        keyword.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

        // Graph side: entities named in the query, then their direct neighbours.
        let query_words = words(query);
        let known: HashSet<&str> = scoped
            .iter()
            .flat_map(|m| m.entities.iter().map(|(k, _)| k.as_str()))
            .collect();
        let direct: HashSet<&str> = known
            .into_iter()
            .filter(|k| mentions(&query_words, k))
            .collect();
        let neighbours: HashSet<&str> = data
            .edges
            .iter()
            .filter(|e| &e.subject == subject)
            .filter_map(|e| {
                if direct.contains(e.from.as_str()) {
                    Some(e.to.as_str())
                } else if direct.contains(e.to.as_str()) {
                    Some(e.from.as_str())
                } else {
                    None
                }
            })
            .filter(|k| !direct.contains(k))
            .collect();

        let mut graph: Vec<(usize, usize, usize, &StoredMemory)> = scoped
            .iter()
            .enumerate()
            .filter_map(|(pos, m)| {
                let d = m.entities.iter().filter(|(k, _)| direct.contains(k.as_str())).count();
                let n = m
                    .entities
                    .iter()
                    .filter(|(k, _)| neighbours.contains(k.as_str()))
                    .count();
                (d + n > 0).then_some((d, n, pos, *m))
            })
            .collect();
        graph.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(b.2.cmp(&a.2)));

        let keyword_hits: Vec<MemoryHit> = keyword.iter().map(|(_, _, m)| to_hit(m)).collect();
        let graph_hits: Vec<MemoryHit> = graph.iter().map(|(_, _, _, m)| to_hit(m)).collect();
        Ok(reciprocal_rank_fusion(&[keyword_hits, graph_hits], RRF_K, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> MemorySubject {
        MemorySubject::new("conv_test")
    }

    #[tokio::test]
    async fn add_and_search_by_keyword() {
        let mem = InMemoryGraphMemory::new();
        mem.add("Rust is great for systems programming", &subject(), Default::default())
            .await
            .unwrap();
        mem.add("Python is great for scripting", &subject(), Default::default())
            .await
            .unwrap();

        let hits = mem.search("systems programming", &subject(), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("Rust"));
    }

    #[tokio::test]
    async fn graph_hop_finds_related_memory() {
        let mem = InMemoryGraphMemory::new();
        mem.add("My name is Bob and I live in London.", &subject(), Default::default())
            .await
            .unwrap();
        mem.add("London has great museums.", &subject(), Default::default())
            .await
            .unwrap();

        let rels = mem.relationships(&subject()).await;
        assert_eq!(rels, vec![("bob".into(), "LIVE_IN".into(), "london".into())]);

        // "Bob" is not in the museum memory, but Bob -LIVE_IN-> London is.
        let hits = mem.search("Tell me about Bob", &subject(), 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.contains("Bob"));
        assert!(hits.iter().any(|h| h.text.contains("museums")));
    }

    #[tokio::test]
    async fn search_is_scoped_by_subject() {
        let mem = InMemoryGraphMemory::new();
        mem.add("Alice likes Rust", &MemorySubject::new("conv_a"), Default::default())
            .await
            .unwrap();

        let other = mem
            .search("Alice", &MemorySubject::new("conv_b"), 5)
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn empty_query_returns_recent() {
        let mem = InMemoryGraphMemory::new();
        for text in ["first", "second", "third"] {
            mem.add(text, &subject(), Default::default()).await.unwrap();
        }
        let hits = mem.search("  ", &subject(), 2).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["third", "second"]);
    }
}
