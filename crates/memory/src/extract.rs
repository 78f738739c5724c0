//! Entity and relationship extraction.
//!
//! The knowledge graph is fed by an [`EntityExtractor`]. Production
//! deployments can plug in a model-backed extractor; the default
//! [`HeuristicExtractor`] is a fast rule-based one that picks capitalised
//! phrases as entities and names the relationship between two entities of a
//! sentence after the words that link them ("Bob lives in London" gives
//! `Bob -LIVES_IN-> London`).

use async_trait::async_trait;
use agentcanvas_core::error::MemoryError;
use serde::{Deserialize, Serialize};

/// An entity found in a piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Surface form, e.g. "New York"
    pub name: String,
    /// Coarse type, e.g. "Location"
    pub label: String,
}

impl Entity {
    /// Normalised identity used for de-duplication and lookup.
    pub fn key(&self) -> String {
        entity_key(&self.name)
    }
}

/// A directed, typed edge between two extracted entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    /// Upper snake case, e.g. "LIVES_IN"
    pub rel_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Extraction, MemoryError>;
}

pub fn entity_key(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

pub const RELATED_TO: &str = "RELATED_TO";

/// Capitalised words that never start an entity.
const NON_ENTITIES: &[&str] = &[
    "a", "an", "the", "i", "i'm", "i've", "me", "my", "mine", "we", "our", "you", "your", "he",
    "his", "she", "her", "they", "their", "it", "its", "this", "that", "these", "those", "hello",
    "hi", "hey", "yes", "no", "ok", "okay", "please", "thanks", "thank", "what", "who", "where",
    "when", "why", "how", "which", "do", "does", "did", "is", "are", "was", "were", "can", "could",
    "would", "should", "will", "and", "but", "or", "so", "if", "then", "also", "tool", "result",
    "error", "agent",
];

/// Words dropped when naming a relationship.
const LINK_FILLER: &[&str] = &[
    "a", "an", "the", "and", "but", "or", "so", "then", "also", "i", "we", "you", "he", "she",
    "they", "it", "my", "our", "your", "his", "her", "their", "is", "are", "was", "were", "be",
    "been", "very", "really", "just",
];

const LOCATIVE: &[&str] = &["in", "at", "from", "near", "to", "into"];

/// Rule-based extractor with no external dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn extract_sync(&self, text: &str) -> Extraction {
        let mut out = Extraction::default();

        for sentence in text.split(['.', '!', '?', '\n', ';']) {
            let words: Vec<&str> = sentence
                .split_whitespace()
                .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-'))
                .filter(|w| !w.is_empty())
                .collect();

            // (entity, index of first word, index past last word)
            let mut found: Vec<(Entity, usize, usize)> = Vec::new();
            let mut i = 0;
            while i < words.len() {
                if !is_entity_word(words[i]) {
                    i += 1;
                    continue;
                }
                let start = i;
                while i < words.len() && is_entity_word(words[i]) {
                    i += 1;
                }
                let name = words[start..i].join(" ");
                let label = match start.checked_sub(1).map(|p| words[p].to_lowercase()) {
                    Some(prev) if LOCATIVE.contains(&prev.as_str()) => "Location",
                    _ => "Entity",
                };
                found.push((
                    Entity {
                        name,
                        label: label.into(),
                    },
                    start,
                    i,
                ));
            }

            for pair in found.windows(2) {
                let (left, _, left_end) = &pair[0];
                let (right, right_start, _) = &pair[1];
                let link: Vec<String> = words[*left_end..*right_start]
                    .iter()
                    .map(|w| w.to_lowercase())
                    .filter(|w| !LINK_FILLER.contains(&w.as_str()))
                    .collect();
                let rel_type = if link.is_empty() || link.len() > 3 {
                    RELATED_TO.to_string()
                } else {
                    link.join("_").to_uppercase()
                };
                out.relationships.push(Relationship {
                    from: left.name.clone(),
                    to: right.name.clone(),
                    rel_type,
                });
            }

            for (entity, _, _) in found {
                if !out.entities.iter().any(|e| e.key() == entity.key()) {
                    out.entities.push(entity);
                }
            }
        }

        out
    }
}

fn is_entity_word(word: &str) -> bool {
    let starts_upper = word.chars().next().is_some_and(|c| c.is_uppercase());
    starts_upper && word.chars().count() > 1 && !NON_ENTITIES.contains(&word.to_lowercase().as_str())
}

#[async_trait]
impl EntityExtractor for HeuristicExtractor {
    async fn extract(&self, text: &str) -> Result<Extraction, MemoryError> {
        Ok(self.extract_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_people_and_places() {
        let ex = HeuristicExtractor.extract_sync("My name is Bob and I live in London.");
        let names: Vec<&str> = ex.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "London"]);
        assert_eq!(ex.entities[1].label, "Location");
        assert_eq!(
            ex.relationships,
            vec![Relationship {
                from: "Bob".into(),
                to: "London".into(),
                rel_type: "LIVE_IN".into(),
            }]
        );
    }

    #[test]
    fn multi_word_entities_are_merged() {
        let ex = HeuristicExtractor.extract_sync("Alice moved to New York last year");
        assert!(ex.entities.iter().any(|e| e.name == "New York"));
        assert_eq!(ex.relationships[0].rel_type, "MOVED_TO");
    }

    #[test]
    fn sentence_openers_are_not_entities() {
        let ex = HeuristicExtractor.extract_sync("Hello, agent! What is the weather?");
        assert!(ex.entities.is_empty());
        assert!(ex.relationships.is_empty());
    }

    #[test]
    fn long_links_fall_back_to_related_to() {
        let ex = HeuristicExtractor
            .extract_sync("Carol said that after many long years she finally met Dave");
        assert_eq!(ex.relationships[0].rel_type, RELATED_TO);
    }

    #[test]
    fn entities_are_deduplicated_by_key() {
        let ex = HeuristicExtractor.extract_sync("Rust is fast. I like Rust.");
        assert_eq!(ex.entities.len(), 1);
        assert_eq!(ex.entities[0].key(), "rust");
    }
}
