//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/mcp/invoke`: Run one conversation turn
//! - `GET|POST /v1/agents`, `GET|PATCH|DELETE /v1/agents/{id}`
//! - `GET|POST /v1/teams`, `GET|PATCH|DELETE /v1/teams/{id}`
//! - `GET|POST /v1/teams/{id}/agents`, `DELETE /v1/teams/{id}/agents/{agent_id}`
//! - `GET|POST /v1/conversations`, `GET|PATCH|DELETE /v1/conversations/{id}`
//! - `GET /v1/conversations/{id}/messages`, `GET /v1/conversations/{id}/agent-states`
//! - `POST /v1/messages`, `GET /v1/messages/{id}`
//! - `GET|POST /v1/agent-states`, `GET|DELETE /v1/agent-states/{id}`
//! - `GET|POST /v1/evaluation-results`, `GET /v1/evaluation-results/{id}`

use agentcanvas_core::entity::{
    Agent, AgentState, AgentStateUpsert, AgentUpdate, Conversation, ConversationUpdate,
    EvaluationResult, NewAgent, NewConversation, NewEvaluationResult, NewTeam, Team, TeamMember,
    TeamUpdate,
};
use agentcanvas_core::error::{Error, StoreError};
use agentcanvas_core::message::{Message, NewMessage};
use agentcanvas_store::{AgentStateFilter, ConversationFilter, Page};
use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::SharedState;

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/mcp/invoke", post(invoke_handler))
        .route("/agents", get(list_agents).post(create_agent))
        .route("/agents/{id}", get(get_agent).patch(update_agent).delete(delete_agent))
        .route("/teams", get(list_teams).post(create_team))
        .route("/teams/{id}", get(get_team).patch(update_team).delete(delete_team))
        .route("/teams/{id}/agents", get(list_team_agents).post(add_team_agent))
        .route("/teams/{id}/agents/{agent_id}", delete(remove_team_agent))
        .route("/conversations", get(list_conversations).post(create_conversation))
        .route(
            "/conversations/{id}",
            get(get_conversation).patch(update_conversation).delete(delete_conversation),
        )
        .route("/conversations/{id}/messages", get(list_conversation_messages))
        .route("/conversations/{id}/agent-states", get(list_conversation_states))
        .route("/messages", post(create_message))
        .route("/messages/{id}", get(get_message))
        .route("/agent-states", get(list_agent_states).post(upsert_agent_state))
        .route("/agent-states/{id}", get(get_agent_state).delete(delete_agent_state))
        .route("/evaluation-results", get(list_evaluations).post(create_evaluation))
        .route("/evaluation-results/{id}", get(get_evaluation))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// A failed request. Only the failure kind and a summary reach the client.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Core(Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Core(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Core(Error::Store(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "BadRequest", message.clone()),
            ApiError::Core(Error::Store(StoreError::NotFound { .. })) => {
                (StatusCode::NOT_FOUND, "NotFound", self.summary())
            }
            ApiError::Core(Error::Store(StoreError::Conflict(_))) => {
                (StatusCode::CONFLICT, "Conflict", "The resource already exists".into())
            }
            ApiError::Core(e) => {
                error!(kind = e.kind(), "Request failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, e.kind(), e.summary())
            }
        };
        (
            status,
            Json(ErrorBody {
                error: kind.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

impl ApiError {
    fn summary(&self) -> String {
        match self {
            ApiError::BadRequest(message) => message.clone(),
            ApiError::Core(e) => e.summary(),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_id(field: &str, raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("{field} is not a valid UUID")))
}

// ── Invoke ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<InvokeMessage>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// One message of the request's transcript. Only the last user message is used.
#[derive(Debug, Deserialize)]
pub struct InvokeMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub conversation_id: Uuid,
    pub message: ReplyMessage,
    /// Set when some messages of the turn could not be stored
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial_persistence: bool,
}

async fn invoke_handler(
    State(state): State<SharedState>,
    Json(request): Json<InvokeRequest>,
) -> ApiResult<Json<InvokeResponse>> {
    let content = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role.eq_ignore_ascii_case("user"))
        .map(|m| m.content.clone())
        .ok_or_else(|| ApiError::BadRequest("No user message found in request".into()))?;

    let conversation_id = match request.conversation_id.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => parse_id("conversation_id", raw)?,
        None => Uuid::new_v4(),
    };
    let agent_id = request
        .agent_id
        .as_deref()
        .map(|raw| parse_id("agent_id", raw))
        .transpose()?;

    info!(%conversation_id, content_len = content.len(), "v1/mcp/invoke request");

    let outcome = state
        .handle_user_message(conversation_id, content, request.user_id, agent_id)
        .await?;

    Ok(Json(InvokeResponse {
        conversation_id,
        message: ReplyMessage {
            role: "assistant".into(),
            content: outcome.content.clone(),
        },
        partial_persistence: outcome.is_partial(),
    }))
}

// ── Agents ────────────────────────────────────────────────────────────────

async fn list_agents(State(state): State<SharedState>, Query(page): Query<Page>) -> ApiResult<Json<Vec<Agent>>> {
    Ok(Json(state.store.list_agents(page).await?))
}

async fn create_agent(
    State(state): State<SharedState>,
    Json(new): Json<NewAgent>,
) -> ApiResult<(StatusCode, Json<Agent>)> {
    Ok((StatusCode::CREATED, Json(state.store.create_agent(new).await?)))
}

async fn get_agent(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Json<Agent>> {
    Ok(Json(state.store.require_agent(id).await?))
}

async fn update_agent(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(update): Json<AgentUpdate>,
) -> ApiResult<Json<Agent>> {
    Ok(Json(state.store.update_agent(id, update).await?))
}

async fn delete_agent(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.store.delete_agent(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Teams ─────────────────────────────────────────────────────────────────

async fn list_teams(State(state): State<SharedState>, Query(page): Query<Page>) -> ApiResult<Json<Vec<Team>>> {
    Ok(Json(state.store.list_teams(page).await?))
}

async fn create_team(
    State(state): State<SharedState>,
    Json(new): Json<NewTeam>,
) -> ApiResult<(StatusCode, Json<Team>)> {
    Ok((StatusCode::CREATED, Json(state.store.create_team(new).await?)))
}

async fn get_team(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Json<Team>> {
    Ok(Json(state.store.require_team(id).await?))
}

async fn update_team(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(update): Json<TeamUpdate>,
) -> ApiResult<Json<Team>> {
    Ok(Json(state.store.update_team(id, update).await?))
}

async fn delete_team(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.store.delete_team(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct AddTeamAgentRequest {
    agent_id: Uuid,
    #[serde(default)]
    role: Option<String>,
}

async fn list_team_agents(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<TeamMember>>> {
    state.store.require_team(id).await?;
    Ok(Json(state.store.list_team_members(id).await?))
}

async fn add_team_agent(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AddTeamAgentRequest>,
) -> ApiResult<(StatusCode, Json<TeamMember>)> {
    let member = state
        .store
        .add_team_agent(id, request.agent_id, request.role)
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

async fn remove_team_agent(
    State(state): State<SharedState>,
    Path((id, agent_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state.store.remove_team_agent(id, agent_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Conversations ─────────────────────────────────────────────────────────

async fn list_conversations(
    State(state): State<SharedState>,
    Query(filter): Query<ConversationFilter>,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<Conversation>>> {
    Ok(Json(state.store.list_conversations(&filter, page).await?))
}

async fn create_conversation(
    State(state): State<SharedState>,
    Json(new): Json<NewConversation>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    Ok((StatusCode::CREATED, Json(state.store.create_conversation(new).await?)))
}

async fn get_conversation(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(state.store.require_conversation(id).await?))
}

async fn update_conversation(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ConversationUpdate>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(state.store.update_conversation(id, update).await?))
}

async fn delete_conversation(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.store.delete_conversation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_conversation_messages(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<Message>>> {
    state.store.require_conversation(id).await?;
    Ok(Json(state.store.list_messages(id, page).await?))
}

async fn list_conversation_states(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<AgentState>>> {
    state.store.require_conversation(id).await?;
    let filter = AgentStateFilter {
        conversation_id: Some(id),
        agent_id: None,
    };
    Ok(Json(state.store.list_agent_states(&filter, page).await?))
}

// ── Messages ──────────────────────────────────────────────────────────────

async fn create_message(
    State(state): State<SharedState>,
    Json(new): Json<NewMessage>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    Ok((StatusCode::CREATED, Json(state.store.append_message(new).await?)))
}

async fn get_message(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Json<Message>> {
    Ok(Json(state.store.require_message(id).await?))
}

// ── Agent states ──────────────────────────────────────────────────────────

async fn list_agent_states(
    State(state): State<SharedState>,
    Query(filter): Query<AgentStateFilter>,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<AgentState>>> {
    Ok(Json(state.store.list_agent_states(&filter, page).await?))
}

/// Upsert keyed on (conversation_id, agent_id).
async fn upsert_agent_state(
    State(state): State<SharedState>,
    Json(upsert): Json<AgentStateUpsert>,
) -> ApiResult<Json<AgentState>> {
    Ok(Json(state.store.upsert_state(upsert).await?))
}

async fn get_agent_state(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Json<AgentState>> {
    Ok(Json(state.store.require_agent_state(id).await?))
}

async fn delete_agent_state(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.store.delete_agent_state(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Evaluation results ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EvaluationQuery {
    conversation_id: Uuid,
}

async fn list_evaluations(
    State(state): State<SharedState>,
    Query(query): Query<EvaluationQuery>,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<EvaluationResult>>> {
    Ok(Json(state.store.list_evaluations(query.conversation_id, page).await?))
}

async fn create_evaluation(
    State(state): State<SharedState>,
    Json(new): Json<NewEvaluationResult>,
) -> ApiResult<(StatusCode, Json<EvaluationResult>)> {
    Ok((StatusCode::CREATED, Json(state.store.create_evaluation(new).await?)))
}

async fn get_evaluation(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EvaluationResult>> {
    Ok(Json(state.store.require_evaluation(id).await?))
}
