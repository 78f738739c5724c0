//! Reasoning model providers for AgentCanvas.
//!
//! All providers implement the `agentcanvas_core::Provider` trait.
//! [`build_from_config`] picks the one the configuration asks for.

pub mod openai_compat;
pub mod placeholder;

pub use openai_compat::OpenAiCompatProvider;
pub use placeholder::PlaceholderProvider;

use agentcanvas_core::error::ProviderError;
use agentcanvas_core::provider::Provider;
use std::sync::Arc;
use tracing::info;

/// The OpenAI-compatible provider when an API key is configured, otherwise
/// the placeholder.
pub fn build_from_config(
    config: &agentcanvas_config::AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    match config.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            info!(api_url = %config.api_url, "Using OpenAI-compatible provider");
            Ok(Arc::new(OpenAiCompatProvider::new("openai", &config.api_url, key)?))
        }
        None => {
            info!("No API key configured, using placeholder provider");
            Ok(Arc::new(PlaceholderProvider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcanvas_config::AppConfig;

    #[test]
    fn no_key_selects_placeholder() {
        let provider = build_from_config(&AppConfig::default()).unwrap();
        assert_eq!(provider.name(), "placeholder");
    }

    #[test]
    fn key_selects_openai_compat() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        assert_eq!(build_from_config(&config).unwrap().name(), "openai");
    }
}
