//! HTTP API gateway for AgentCanvas.
//!
//! Exposes the conversation invoke endpoint, CRUD over the relational
//! entities and a health check. Built on Axum.

pub mod api_v1;

use agentcanvas_agent::{
    ConversationTeamResolver, SessionService, SessionSettings, TurnConfig, TurnOutcome,
    UserUtterance, build_agent_graph,
};
use agentcanvas_config::{AppConfig, MemoryBackendKind, MemoryConfig};
use agentcanvas_core::error::Result;
use agentcanvas_core::memory::MemoryStore;
use agentcanvas_core::message::NewMessage;
use agentcanvas_core::provider::Provider;
use agentcanvas_memory::{InMemoryGraphMemory, NoopMemory, SqliteGraphMemory};
use agentcanvas_store::SqliteStore;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything a request handler needs.
pub struct AppState {
    pub store: SqliteStore,
    pub session: Arc<SessionService>,
    pub cors_origins: Vec<String>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Open the stores named in `config` and wire the agent graph.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.database_url).await?;
        let memory = open_memory(&config.memory).await?;
        let provider = agentcanvas_providers::build_from_config(config)?;
        Self::assemble(config, store, memory, provider)
    }

    /// Wire the agent graph over already-open collaborators.
    pub fn assemble(
        config: &AppConfig,
        store: SqliteStore,
        memory: Arc<dyn MemoryStore>,
        provider: Arc<dyn Provider>,
    ) -> Result<Self> {
        let tools = Arc::new(agentcanvas_tools::default_registry());
        let graph = build_agent_graph(
            Arc::new(store.clone()),
            provider,
            tools,
            TurnConfig::from_config(config),
            config.graph.recursion_limit,
        )?;
        let resolver = ConversationTeamResolver::new(Arc::new(store.clone()), config.default_agent());
        let session = SessionService::new(
            Arc::new(graph),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            memory,
            Arc::new(resolver),
            SessionSettings::from_config(config),
        );

        Ok(Self {
            store,
            session: Arc::new(session),
            cors_origins: config.gateway.cors_origins.clone(),
        })
    }

    /// Persist a user message and run one conversation turn on it.
    ///
    /// The conversation row is created when missing. The stored user message
    /// is excluded from the history the turn loads, so it is seen once.
    pub async fn handle_user_message(
        &self,
        conversation_id: Uuid,
        content: String,
        user_id: Option<String>,
        agent_id: Option<Uuid>,
    ) -> Result<TurnOutcome> {
        self.store
            .ensure_conversation(conversation_id, user_id.clone())
            .await?;
        let stored = self
            .store
            .append_message(NewMessage::user(conversation_id, content.clone()))
            .await?;

        let mut utterance = UserUtterance::new(content).persisted_as(stored.id);
        if let Some(user_id) = user_id {
            utterance = utterance.from_user(user_id);
        }
        if let Some(agent_id) = agent_id {
            utterance = utterance.for_agent(agent_id);
        }
        self.session.run_conversation_turn(conversation_id, utterance).await
    }
}

/// Build the memory backend selected by `[memory] backend`.
pub async fn open_memory(config: &MemoryConfig) -> Result<Arc<dyn MemoryStore>> {
    let memory: Arc<dyn MemoryStore> = match config.backend {
        MemoryBackendKind::Sqlite => Arc::new(SqliteGraphMemory::new(&config.path).await?),
        MemoryBackendKind::InMemory => Arc::new(InMemoryGraphMemory::new()),
        MemoryBackendKind::None => Arc::new(NoopMemory),
    };
    info!(backend = memory.name(), "Memory backend ready");
    Ok(memory)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Build the full router: `/health` plus the v1 API.
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.cors_origins);
    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = Arc::new(AppState::from_config(&config).await?);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_state() -> SharedState {
        let config = AppConfig {
            database_url: "sqlite::memory:".into(),
            ..AppConfig::default()
        };
        let store = SqliteStore::open(&config.database_url).await.unwrap();
        let provider = agentcanvas_providers::build_from_config(&config).unwrap();
        Arc::new(AppState::assemble(&config, store, Arc::new(NoopMemory), provider).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state().await);

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let app = build_router(test_state().await);

        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
    }

    #[tokio::test]
    async fn memory_backend_follows_config() {
        let config = MemoryConfig {
            backend: MemoryBackendKind::InMemory,
            ..MemoryConfig::default()
        };
        assert_eq!(open_memory(&config).await.unwrap().name(), "in_memory");

        let config = MemoryConfig {
            backend: MemoryBackendKind::Sqlite,
            path: "sqlite::memory:".into(),
            ..MemoryConfig::default()
        };
        assert_eq!(open_memory(&config).await.unwrap().name(), "sqlite");
    }
}
