//! `agentcanvas invoke`: run one conversation turn without the HTTP layer.

use agentcanvas_config::AppConfig;
use agentcanvas_gateway::AppState;
use anyhow::Context;
use uuid::Uuid;

pub async fn run(
    config: AppConfig,
    conversation: Option<Uuid>,
    agent: Option<Uuid>,
    user: Option<String>,
    text: String,
) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)
        .await
        .context("Failed to open stores")?;
    let conversation_id = conversation.unwrap_or_else(Uuid::new_v4);

    let outcome = state
        .handle_user_message(conversation_id, text, user, agent)
        .await
        .with_context(|| format!("Turn failed for conversation {conversation_id}"))?;

    println!("{}", outcome.content);
    let agent = outcome
        .agent_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".into());
    eprintln!(
        "conversation {}, agent {agent}, {} steps",
        outcome.conversation_id, outcome.steps
    );
    for failure in &outcome.failures {
        eprintln!(
            "warning: {} message #{} was not stored: {}",
            failure.role.as_str(), failure.position, failure.reason
        );
    }

    Ok(())
}
