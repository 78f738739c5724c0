//! Configuration loading and validation for AgentCanvas.
//!
//! Loads configuration from `~/.agentcanvas/config.toml` (or the file named
//! by `AGENTCANVAS_CONFIG`) with environment variable overrides. Validates
//! all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Relational store location (sqlx connection string)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// API key for the reasoning model. Without one the placeholder provider is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_tokens: Option<u32>,

    /// Agent used when a conversation has no team to pick one from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent_id: Option<String>,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_database_url() -> String {
    "sqlite://agentcanvas.db".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini-2024-07-18".into()
}
fn default_temperature() -> f32 {
    0.7
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("default_agent_id", &self.default_agent_id)
            .field("graph", &self.graph)
            .field("memory", &self.memory)
            .field("gateway", &self.gateway)
            .field("logging", &self.logging)
            .finish()
    }
}

/// Agent graph settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Maximum number of node executions per run
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,

    /// How many stored messages seed a run
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default)]
    pub tool_routing: ToolRoutingMode,
}

fn default_recursion_limit() -> usize {
    50
}
fn default_history_window() -> usize {
    50
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            recursion_limit: default_recursion_limit(),
            history_window: default_history_window(),
            tool_routing: ToolRoutingMode::default(),
        }
    }
}

/// When the agent turn hands over to the tool turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRoutingMode {
    /// Only when the agent requested at least one tool call
    #[default]
    Conditional,
    /// After every agent turn
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub backend: MemoryBackendKind,

    /// Database file for the sqlite backend
    #[serde(default = "default_memory_path")]
    pub path: String,

    #[serde(default)]
    pub scope: MemoryScope,

    /// Number of memories recalled into an agent turn
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Fire-and-forget memory writes
    #[serde(default = "default_true")]
    pub detached_writes: bool,
}

fn default_memory_path() -> String {
    "sqlite://agentcanvas-memory.db".into()
}
fn default_recall_limit() -> usize {
    5
}
fn default_true() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackendKind::default(),
            path: default_memory_path(),
            scope: MemoryScope::default(),
            recall_limit: default_recall_limit(),
            detached_writes: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackendKind {
    #[default]
    Sqlite,
    InMemory,
    None,
}

/// Which identity memories are filed under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    #[default]
    Conversation,
    /// Per user when the request names one, otherwise per conversation
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    8050
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost".into(), "http://localhost:3000".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors_origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl AppConfig {
    /// Load configuration from `AGENTCANVAS_CONFIG` or `~/.agentcanvas/config.toml`,
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("AGENTCANVAS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("AGENTCANVAS_DATABASE_URL") {
            self.database_url = url;
        }
        if self.api_key.is_none() {
            self.api_key = lookup("AGENTCANVAS_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("AGENTCANVAS_API_URL") {
            self.api_url = url;
        }
        if let Some(model) = lookup("AGENTCANVAS_MODEL") {
            self.default_model = model;
        }
        if let Some(agent) = lookup("AGENTCANVAS_DEFAULT_AGENT") {
            self.default_agent_id = Some(agent);
        }
        if let Some(port) = lookup("AGENTCANVAS_PORT") {
            match port.parse() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!("Ignoring invalid AGENTCANVAS_PORT '{port}'"),
            }
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentcanvas")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.graph.recursion_limit == 0 {
            return Err(ConfigError::ValidationError(
                "graph.recursion_limit must be at least 1".into(),
            ));
        }

        if self.graph.history_window == 0 {
            return Err(ConfigError::ValidationError(
                "graph.history_window must be at least 1".into(),
            ));
        }

        if let Some(agent) = &self.default_agent_id {
            if uuid::Uuid::parse_str(agent).is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "default_agent_id '{agent}' is not a UUID"
                )));
            }
        }

        Ok(())
    }

    /// The configured fallback agent, if any.
    pub fn default_agent(&self) -> Option<uuid::Uuid> {
        self.default_agent_id
            .as_deref()
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Render the configuration as TOML with secrets removed.
    pub fn to_redacted_toml(&self) -> String {
        let mut shown = self.clone();
        shown.api_key = shown.api_key.map(|_| "[REDACTED]".into());
        toml::to_string_pretty(&shown).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: None,
            default_agent_id: None,
            graph: GraphConfig::default(),
            memory: MemoryConfig::default(),
            gateway: GatewayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.graph.recursion_limit, 50);
        assert_eq!(config.graph.history_window, 50);
        assert_eq!(config.gateway.port, 8050);
        assert_eq!(config.graph.tool_routing, ToolRoutingMode::Conditional);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.memory.backend, MemoryBackendKind::Sqlite);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_url = "sqlite::memory:"

[graph]
recursion_limit = 8
tool_routing = "always"

[memory]
backend = "in_memory"
scope = "user"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.graph.recursion_limit, 8);
        assert_eq!(config.graph.history_window, 50);
        assert_eq!(config.graph.tool_routing, ToolRoutingMode::Always);
        assert_eq!(config.memory.backend, MemoryBackendKind::InMemory);
        assert_eq!(config.memory.scope, MemoryScope::User);
        assert_eq!(config.memory.recall_limit, 5);
    }

    #[test]
    fn zero_recursion_limit_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[graph]\nrecursion_limit = 0").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[graph\nrecursion_limit = ").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_model, "gpt-4o-mini-2024-07-18");
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("AGENTCANVAS_DATABASE_URL", "sqlite://other.db"),
            ("OPENAI_API_KEY", "sk-test"),
            ("AGENTCANVAS_PORT", "9000"),
            ("LOG_LEVEL", "DEBUG"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database_url, "sqlite://other.db");
        assert!(config.has_api_key());
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(|k| (k == "AGENTCANVAS_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.gateway.port, 8050);
    }

    #[test]
    fn default_agent_must_be_uuid() {
        let config = AppConfig {
            default_agent_id: Some("agent_1".into()),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let id = uuid::Uuid::new_v4();
        let config = AppConfig {
            default_agent_id: Some(id.to_string()),
            ..AppConfig::default()
        };
        assert_eq!(config.default_agent(), Some(id));
    }

    #[test]
    fn debug_and_toml_redact_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        assert!(!format!("{config:?}").contains("sk-secret"));
        assert!(!config.to_redacted_toml().contains("sk-secret"));
    }
}
