//! `agentcanvas config`: configuration management commands.

use agentcanvas_config::{AppConfig, MemoryBackendKind};

pub fn show(config: &AppConfig) {
    println!("{}", config.to_redacted_toml());
}

pub fn path() {
    println!("{}", config_path().display());
}

fn config_path() -> std::path::PathBuf {
    std::env::var("AGENTCANVAS_CONFIG")
        .map(Into::into)
        .unwrap_or_else(|_| AppConfig::config_dir().join("config.toml"))
}

/// Non-fatal observations about a configuration that already passed validation.
pub fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (OPENAI_API_KEY); replies come from the placeholder provider");
    }
    if config.default_agent_id.is_none() {
        warnings.push("No default_agent_id; conversations without a team need an explicit agent");
    }
    if config.memory.backend == MemoryBackendKind::None {
        warnings.push("Memory backend is 'none'; nothing will be recalled");
    }
    if config.gateway.host == "0.0.0.0" {
        warnings.push("Gateway binds every interface");
    }
    warnings
}

pub fn validate(config: &AppConfig) -> anyhow::Result<()> {
    config.validate()?;
    println!("Config parsed and validated");

    for w in warnings(config) {
        println!("   warning: {w}");
    }

    println!();
    println!("   Model:     {}", config.default_model);
    println!("   Database:  {}", config.database_url);
    println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   Memory:    {:?} ({:?} scope)", config.memory.backend, config.memory.scope);
    println!(
        "   Graph:     ceiling {}, history {}, routing {:?}",
        config.graph.recursion_limit, config.graph.history_window, config.graph.tool_routing
    );
    Ok(())
}
