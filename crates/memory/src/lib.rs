//! Knowledge-graph memory backends for AgentCanvas.
//!
//! Every backend extracts entities and relationships from the text it is
//! given and answers searches by fusing keyword ranking with a one-hop walk
//! of the entity graph.

pub mod extract;
pub mod rank;
pub mod noop;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use extract::{Entity, EntityExtractor, Extraction, HeuristicExtractor, Relationship};
pub use noop::NoopMemory;
pub use in_memory::InMemoryGraphMemory;
pub use rank::reciprocal_rank_fusion;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteGraphMemory;
