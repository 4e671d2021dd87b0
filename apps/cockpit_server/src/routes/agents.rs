use crate::error::ApiError;
use crate::rbac::{require_permission, CurrentUser};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use cockpit_engine::agent_service;
use cockpit_model::{AgentCommandStatus, AuditEvent};
use serde::Deserialize;
use serde_json::{json, Value};

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "agents", "read").await?;
    let agents = state
        .ctx
        .agents
        .list_agents()
        .await
        .map_err(cockpit_engine::EngineError::from)?;
    Ok(Json(json!({"agents": agents})))
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub agent_id: String,
    pub command: String,
    #[serde(default)]
    pub params: Value,
}

/// Fire-and-forget dispatch; the row is tracked via the history endpoints.
pub async fn command(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "agents", "write").await?;
    let params = if request.params.is_null() {
        json!({})
    } else {
        request.params
    };
    let row = agent_service::send_command(
        &state.ctx,
        &request.agent_id,
        &request.command,
        params,
        &user.username,
    )
    .await?;
    Ok(Json(json!({"command_id": row.command_id, "status": row.status})))
}

#[derive(Debug, Deserialize)]
pub struct GitPullRequest {
    pub agent_id: String,
    pub repository_path: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".into()
}

/// Wait-and-return variant; 504 on agent timeout, 503 when the agent is
/// offline (no command row is persisted in that case).
pub async fn git_pull(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<GitPullRequest>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "agents", "write").await?;
    let response = agent_service::git_pull(
        &state.ctx,
        &request.agent_id,
        &request.repository_path,
        &request.branch,
        &user.username,
    )
    .await?;

    let _ = state
        .ctx
        .store
        .audit()
        .append(&AuditEvent::new(
            &user.username,
            "agent_git_pull",
            format!("git_pull on {} -> {}", request.agent_id, response.status.as_str()),
        ))
        .await;
    respond(response)
}

#[derive(Debug, Deserialize)]
pub struct DockerRestartRequest {
    pub agent_id: String,
}

pub async fn docker_restart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<DockerRestartRequest>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "agents", "write").await?;
    let response =
        agent_service::docker_restart(&state.ctx, &request.agent_id, &user.username).await?;

    let _ = state
        .ctx
        .store
        .audit()
        .append(&AuditEvent::new(
            &user.username,
            "agent_docker_restart",
            format!("docker_restart on {} -> {}", request.agent_id, response.status.as_str()),
        ))
        .await;
    respond(response)
}

fn respond(response: cockpit_model::AgentResponse) -> Result<Json<Value>, ApiError> {
    match response.status {
        AgentCommandStatus::Timeout => Err(ApiError::new(
            StatusCode::GATEWAY_TIMEOUT,
            response
                .error
                .unwrap_or_else(|| "agent response timeout".into()),
        )),
        _ => Ok(Json(json!({
            "command_id": response.command_id,
            "status": response.status,
            "output": response.output,
            "error": response.error,
            "execution_time_ms": response.execution_time_ms,
        }))),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(agent_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "agents", "read").await?;
    let commands = state
        .ctx
        .store
        .agent_commands()
        .history(&agent_id, query.limit.clamp(1, 500))
        .await?;
    Ok(Json(json!({"agent_id": agent_id, "commands": commands})))
}

pub async fn all_history(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "agents", "read").await?;
    let commands = state
        .ctx
        .store
        .agent_commands()
        .all_history(query.limit.clamp(1, 500))
        .await?;
    Ok(Json(json!({"commands": commands})))
}
