//! SQLite knowledge-graph backend.
//!
//! One database file, five tables, all scoped by subject:
//! - `memories`: the raw memory items
//! - `memories_fts`: FTS5 index over memory text for BM25 keyword ranking
//! - `entities`: one row per distinct entity per subject
//! - `memory_entities`: which memory mentions which entity
//! - `relationships`: typed edges between entities
//!
//! Search fuses BM25 keyword hits with graph hits (memories mentioning an
//! entity named in the query, then memories one relationship hop away).

use async_trait::async_trait;
use chrono::Utc;
use agentcanvas_core::error::MemoryError;
use agentcanvas_core::memory::{MemoryHit, MemoryStore, MemorySubject};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::extract::{EntityExtractor, HeuristicExtractor, entity_key};
use crate::rank::{RRF_K, mentions, reciprocal_rank_fusion, words};

/// A persistent memory store backed by SQLite.
pub struct SqliteGraphMemory {
    pool: SqlitePool,
    extractor: Arc<dyn EntityExtractor>,
}

impl SqliteGraphMemory {
    /// Open (or create) the database at `url` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(url: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // An in-memory database exists per connection, so keep exactly one.
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite memory store initialized at {url}");
        Ok(store)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self {
            pool,
            extractor: Arc::new(HeuristicExtractor),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        let statements: [(&str, &str); 8] = [
            (
                "memories table",
                r#"
                CREATE TABLE IF NOT EXISTS memories (
                    iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                    id         TEXT UNIQUE NOT NULL,
                    subject    TEXT NOT NULL,
                    content    TEXT NOT NULL,
                    metadata   TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "subject index",
                "CREATE INDEX IF NOT EXISTS idx_memories_subject ON memories(subject, iid)",
            ),
            (
                "FTS5 table",
                r#"
                CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
                    content,
                    content='memories',
                    content_rowid='iid',
                    tokenize='porter unicode61'
                )
                "#,
            ),
            (
                "insert trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
                    INSERT INTO memories_fts(rowid, content) VALUES (new.iid, new.content);
                END
                "#,
            ),
            (
                "delete trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
                    INSERT INTO memories_fts(memories_fts, rowid, content)
                    VALUES ('delete', old.iid, old.content);
                END
                "#,
            ),
            (
                "entities table",
                r#"
                CREATE TABLE IF NOT EXISTS entities (
                    id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    subject    TEXT NOT NULL,
                    key        TEXT NOT NULL,
                    name       TEXT NOT NULL,
                    label      TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE(subject, key)
                )
                "#,
            ),
            (
                "memory_entities table",
                r#"
                CREATE TABLE IF NOT EXISTS memory_entities (
                    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
                    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                    PRIMARY KEY (memory_id, entity_id)
                )
                "#,
            ),
            (
                "relationships table",
                r#"
                CREATE TABLE IF NOT EXISTS relationships (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    subject     TEXT NOT NULL,
                    from_entity INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                    to_entity   INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                    rel_type    TEXT NOT NULL,
                    memory_id   TEXT NOT NULL,
                    created_at  TEXT NOT NULL,
                    UNIQUE(subject, from_entity, to_entity, rel_type)
                )
                "#,
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite memory migrations complete");
        Ok(())
    }

    fn row_to_hit(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryHit, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let text: String = row
            .try_get("content")
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| MemoryError::QueryFailed(format!("memory {id} has bad created_at: {e}")))?;

        Ok(MemoryHit {
            id,
            text,
            score: 0.0,
            entities: Vec::new(),
            created_at,
        })
    }

    /// FTS5 query matching any of the words; each word is quoted.
    fn sanitize_fts_query(text: &str) -> String {
        text.split_whitespace()
            .map(|w| {
                w.chars()
                    .filter(|c| c.is_alphanumeric() || *c == '_')
                    .collect::<String>()
            })
            .filter(|w| w.chars().count() > 2)
            .map(|w| format!("\"{w}\""))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    async fn keyword_hits(
        &self,
        query: &str,
        subject: &MemorySubject,
        limit: usize,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        let fts_query = Self::sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(vec![]);
        }

        let rows = sqlx::query(
            r#"
            SELECT m.id, m.content, m.created_at, bm25(memories_fts) AS rank
            FROM memories_fts f
            JOIN memories m ON m.iid = f.rowid
            WHERE memories_fts MATCH ?1 AND m.subject = ?2
            ORDER BY rank, m.iid DESC
            LIMIT ?3
            "#,
        )
        .bind(&fts_query)
        .bind(subject.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("FTS5 search: {e}")))?;

        rows.iter().map(Self::row_to_hit).collect()
    }

    async fn graph_hits(
        &self,
        query: &str,
        subject: &MemorySubject,
        limit: usize,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        let rows = sqlx::query("SELECT id, key FROM entities WHERE subject = ?1")
            .bind(subject.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("entity scan: {e}")))?;

        let query_words = words(query);
        let mut direct: Vec<i64> = Vec::new();
        for row in &rows {
            let key: String = row
                .try_get("key")
                .map_err(|e| MemoryError::QueryFailed(format!("key column: {e}")))?;
            if mentions(&query_words, &key) {
                let id: i64 = row
                    .try_get("id")
                    .map_err(|e| MemoryError::QueryFailed(format!("entity id column: {e}")))?;
                direct.push(id);
            }
        }
        if direct.is_empty() {
            return Ok(vec![]);
        }

        // The seed set is tiny, so it is inlined as a JSON array.
        let seeds = serde_json::to_string(&direct)
            .map_err(|e| MemoryError::QueryFailed(format!("seed encoding: {e}")))?;

        let rows = sqlx::query(
            r#"
            WITH seed(entity_id) AS (SELECT value FROM json_each(?1)),
            hop(entity_id) AS (
                SELECT r.to_entity FROM relationships r
                WHERE r.subject = ?2 AND r.from_entity IN (SELECT entity_id FROM seed)
                UNION
                SELECT r.from_entity FROM relationships r
                WHERE r.subject = ?2 AND r.to_entity IN (SELECT entity_id FROM seed)
            )
            SELECT m.id, m.content, m.created_at,
                   SUM(CASE WHEN me.entity_id IN (SELECT entity_id FROM seed) THEN 1 ELSE 0 END) AS direct_hits,
                   COUNT(*) AS all_hits
            FROM memory_entities me
            JOIN memories m ON m.id = me.memory_id
            WHERE m.subject = ?2
              AND (me.entity_id IN (SELECT entity_id FROM seed)
                   OR me.entity_id IN (SELECT entity_id FROM hop))
            GROUP BY m.iid
            ORDER BY direct_hits DESC, all_hits DESC, m.iid DESC
            LIMIT ?3
            "#,
        )
        .bind(&seeds)
        .bind(subject.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("graph search: {e}")))?;

        rows.iter().map(Self::row_to_hit).collect()
    }

    async fn attach_entities(&self, hits: &mut [MemoryHit]) -> Result<(), MemoryError> {
        for hit in hits.iter_mut() {
            let rows = sqlx::query(
                r#"
                SELECT e.name FROM memory_entities me
                JOIN entities e ON e.id = me.entity_id
                WHERE me.memory_id = ?1
                ORDER BY e.id
                "#,
            )
            .bind(&hit.id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("entity lookup: {e}")))?;

            hit.entities = rows
                .iter()
                .filter_map(|row| row.try_get::<String, _>("name").ok())
                .collect();
        }
        Ok(())
    }

    /// Relationships known for a subject, as (from, rel_type, to) entity names.
    pub async fn relationships(
        &self,
        subject: &MemorySubject,
    ) -> Result<Vec<(String, String, String)>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT a.name AS from_name, r.rel_type, b.name AS to_name
            FROM relationships r
            JOIN entities a ON a.id = r.from_entity
            JOIN entities b ON b.id = r.to_entity
            WHERE r.subject = ?1
            ORDER BY r.id
            "#,
        )
        .bind(subject.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("relationship scan: {e}")))?;

        rows.iter()
            .map(|row| {
                let get = |col: &str| {
                    row.try_get::<String, _>(col)
                        .map_err(|e| MemoryError::QueryFailed(format!("{col} column: {e}")))
                };
                Ok((get("from_name")?, get("rel_type")?, get("to_name")?))
            })
            .collect()
    }
}

#[async_trait]
impl MemoryStore for SqliteGraphMemory {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn add(
        &self,
        text: &str,
        subject: &MemorySubject,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, MemoryError> {
        let extraction = self.extractor.extract(text).await?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let metadata = serde_json::to_string(&metadata)
            .map_err(|e| MemoryError::Storage(format!("Metadata serialization: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query(
            "INSERT INTO memories (id, subject, content, metadata, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&id)
        .bind(subject.as_str())
        .bind(text)
        .bind(&metadata)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT memory failed: {e}")))?;

        let mut entity_ids: Vec<(String, i64)> = Vec::with_capacity(extraction.entities.len());
        for entity in &extraction.entities {
            let row = sqlx::query(
                r#"
                INSERT INTO entities (subject, key, name, label, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(subject, key) DO UPDATE SET name = excluded.name
                RETURNING id
                "#,
            )
            .bind(subject.as_str())
            .bind(entity.key())
            .bind(&entity.name)
            .bind(&entity.label)
            .bind(&now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("UPSERT entity failed: {e}")))?;
            let entity_id: i64 = row
                .try_get("id")
                .map_err(|e| MemoryError::Storage(format!("entity id: {e}")))?;

            sqlx::query("INSERT OR IGNORE INTO memory_entities (memory_id, entity_id) VALUES (?1, ?2)")
                .bind(&id)
                .bind(entity_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| MemoryError::Storage(format!("INSERT mention failed: {e}")))?;

            entity_ids.push((entity.key(), entity_id));
        }

        let lookup = |name: &str| {
            let key = entity_key(name);
            entity_ids.iter().find(|(k, _)| *k == key).map(|(_, id)| *id)
        };
        for rel in &extraction.relationships {
            let (Some(from), Some(to)) = (lookup(&rel.from), lookup(&rel.to)) else {
                continue;
            };
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO relationships (subject, from_entity, to_entity, rel_type, memory_id, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(subject.as_str())
            .bind(from)
            .bind(to)
            .bind(&rel.rel_type)
            .bind(&id)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("INSERT relationship failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(
            subject = %subject,
            entities = extraction.entities.len(),
            relationships = extraction.relationships.len(),
            "Stored memory {id}"
        );
        Ok(id)
    }

    async fn search(
        &self,
        query: &str,
        subject: &MemorySubject,
        limit: usize,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        let mut hits = if query.trim().is_empty() {
            let rows = sqlx::query(
                "SELECT id, content, created_at FROM memories WHERE subject = ?1 ORDER BY iid DESC LIMIT ?2",
            )
            .bind(subject.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("recent scan: {e}")))?;
            rows.iter().map(Self::row_to_hit).collect::<Result<Vec<_>, _>>()?
        } else {
            // Over-fetch both sides so fusion has something to work with.
            let keyword = self.keyword_hits(query, subject, limit * 2).await?;
            let graph = self.graph_hits(query, subject, limit * 2).await?;
            reciprocal_rank_fusion(&[keyword, graph], RRF_K, limit)
        };

        self.attach_entities(&mut hits).await?;
        Ok(hits)
    }
}
