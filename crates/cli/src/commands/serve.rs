//! `agentcanvas serve`: start the HTTP gateway.

use agentcanvas_config::AppConfig;

pub async fn run(mut config: AppConfig, port_override: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("AgentCanvas gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Database:  {}", config.database_url);
    if !config.has_api_key() {
        println!("   Provider:  placeholder (no API key configured)");
    }

    agentcanvas_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!("Gateway failed: {e}"))
}
