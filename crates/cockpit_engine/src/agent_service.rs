//! Control-plane side of the agent bus: persist the command row, publish,
//! correlate the response, and keep the row in sync.

use crate::{EngineContext, EngineError};
use cockpit_model::{AgentCommand, AgentCommandStatus, AgentResponse};
use serde_json::Value;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Hard ceiling on caller-specified waits.
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 3600);

/// Fire-and-forget: persist a pending command row and publish it.
pub async fn send_command(
    ctx: &EngineContext,
    agent_id: &str,
    command: &str,
    params: Value,
    sent_by: &str,
) -> Result<AgentCommand, EngineError> {
    let command_id = Uuid::new_v4();
    let row = ctx
        .store
        .agent_commands()
        .save(agent_id, command_id, command, &params, sent_by)
        .await?;
    ctx.agents.send(agent_id, command_id, command, params).await?;
    Ok(row)
}

/// Send and block for the correlated response. On timeout the row moves to
/// `timeout`; a response arriving later is dropped by the row guard.
pub async fn send_and_wait(
    ctx: &EngineContext,
    agent_id: &str,
    command: &str,
    params: Value,
    sent_by: &str,
    timeout: Duration,
) -> Result<AgentResponse, EngineError> {
    if !ctx.agents.is_online(agent_id).await? {
        return Err(EngineError::AgentOffline(agent_id.to_string()));
    }

    let timeout = timeout.min(MAX_WAIT);
    let row = send_command(ctx, agent_id, command, params, sent_by).await?;

    match ctx
        .agents
        .wait_for_response(agent_id, row.command_id, timeout)
        .await?
    {
        Some(response) => {
            ctx.store
                .agent_commands()
                .complete(
                    row.command_id,
                    response.status,
                    response.output.as_deref(),
                    response.error.as_deref(),
                    response.execution_time_ms,
                )
                .await?;
            info!(agent_id, command, status = response.status.as_str(), "agent responded");
            Ok(response)
        }
        None => {
            let error = format!("Response timeout after {}s", timeout.as_secs());
            ctx.store
                .agent_commands()
                .complete(
                    row.command_id,
                    AgentCommandStatus::Timeout,
                    None,
                    Some(&error),
                    None,
                )
                .await?;
            Ok(AgentResponse {
                command_id: row.command_id,
                status: AgentCommandStatus::Timeout,
                output: None,
                error: Some(error),
                execution_time_ms: None,
            })
        }
    }
}

pub async fn git_pull(
    ctx: &EngineContext,
    agent_id: &str,
    repository_path: &str,
    branch: &str,
    sent_by: &str,
) -> Result<AgentResponse, EngineError> {
    send_and_wait(
        ctx,
        agent_id,
        "git_pull",
        serde_json::json!({"repository_path": repository_path, "branch": branch}),
        sent_by,
        Duration::from_secs(30),
    )
    .await
}

pub async fn docker_restart(
    ctx: &EngineContext,
    agent_id: &str,
    sent_by: &str,
) -> Result<AgentResponse, EngineError> {
    send_and_wait(
        ctx,
        agent_id,
        "docker_restart",
        serde_json::json!({}),
        sent_by,
        Duration::from_secs(60),
    )
    .await
}
