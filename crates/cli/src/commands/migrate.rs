//! `agentcanvas migrate`: create or upgrade the database schema.

use agentcanvas_config::AppConfig;
use agentcanvas_store::SqliteStore;
use anyhow::Context;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Migrating {}", config.database_url);

    // Opening the store applies every pending migration.
    let store = SqliteStore::open(&config.database_url)
        .await
        .context("Failed to open database")?;
    store.ping().await.context("Database is not reachable")?;
    println!("   Relational schema up to date");

    agentcanvas_gateway::open_memory(&config.memory)
        .await
        .context("Failed to open memory backend")?;
    println!("   Memory backend ready ({:?})", config.memory.backend);

    Ok(())
}
