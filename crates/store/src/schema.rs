//! Schema migrations, run every time a store is opened.

use agentcanvas_core::error::StoreError;
use sqlx::SqlitePool;
use tracing::debug;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "agents table",
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL,
            description   TEXT,
            system_prompt TEXT,
            config        TEXT NOT NULL DEFAULT '{}',
            created_at    TEXT NOT NULL,
            updated_at    TEXT
        )
        "#,
    ),
    (
        "teams table",
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT,
            config      TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL,
            updated_at  TEXT
        )
        "#,
    ),
    (
        "team_agents table",
        r#"
        CREATE TABLE IF NOT EXISTS team_agents (
            seq       INTEGER PRIMARY KEY AUTOINCREMENT,
            team_id   TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
            agent_id  TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
            role      TEXT,
            joined_at TEXT NOT NULL,
            UNIQUE(team_id, agent_id)
        )
        "#,
    ),
    (
        "conversations table",
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id         TEXT PRIMARY KEY,
            team_id    TEXT REFERENCES teams(id) ON DELETE SET NULL,
            user_id    TEXT,
            title      TEXT,
            metadata   TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT
        )
        "#,
    ),
    (
        "messages table",
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT UNIQUE NOT NULL,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            agent_id        TEXT,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            tool_calls      TEXT,
            tool_call_id    TEXT,
            metadata        TEXT NOT NULL DEFAULT '{}',
            created_at      TEXT NOT NULL
        )
        "#,
    ),
    (
        "messages index",
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at, seq)",
    ),
    (
        "agent_states table",
        r#"
        CREATE TABLE IF NOT EXISTS agent_states (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            agent_id        TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
            state_data      TEXT NOT NULL DEFAULT '{}',
            version         TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT,
            UNIQUE(conversation_id, agent_id)
        )
        "#,
    ),
    (
        "evaluation_results table",
        r#"
        CREATE TABLE IF NOT EXISTS evaluation_results (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT UNIQUE NOT NULL,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            evaluator_id    TEXT,
            metrics         TEXT NOT NULL DEFAULT '{}',
            score           REAL,
            feedback        TEXT,
            created_at      TEXT NOT NULL
        )
        "#,
    ),
];

pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    for (what, sql) in MIGRATIONS {
        sqlx::query(sql)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration {what}: {e}")))?;
    }
    debug!(count = MIGRATIONS.len(), "Store migrations complete");
    Ok(())
}
