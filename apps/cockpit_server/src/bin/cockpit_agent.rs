//! Site agent: subscribes to its command channel, heartbeats into the
//! registry, and executes the allow-listed local commands.

use anyhow::{Context, Result};
use chrono::Utc;
use cockpit_broker::{AgentBus, HEARTBEAT_INTERVAL_SECS};
use cockpit_model::{AgentCommandStatus, AgentRequest, AgentResponse};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const CAPABILITIES: &[&str] = &["git_pull", "docker_restart", "echo"];

struct AgentConfig {
    agent_id: String,
    redis_url: String,
    /// Local allow-lists; a command naming anything else is refused.
    git_repo_paths: Vec<String>,
    docker_containers: Vec<String>,
}

impl AgentConfig {
    fn from_env() -> Result<Self> {
        let agent_id = std::env::var("COCKPIT_AGENT_ID").context("COCKPIT_AGENT_ID must be set")?;
        Ok(Self {
            agent_id,
            redis_url: std::env::var("COCKPIT_REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/1".into()),
            git_repo_paths: env_list("COCKPIT_AGENT_GIT_PATHS"),
            docker_containers: env_list("COCKPIT_AGENT_DOCKER_CONTAINERS"),
        })
    }
}

fn env_list(var: &str) -> Vec<String> {
    std::env::var(var)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let config = Arc::new(AgentConfig::from_env()?);
    let bus = Arc::new(AgentBus::new(&config.redis_url)?);
    let commands_executed = Arc::new(AtomicU64::new(0));
    let started_at = Utc::now().timestamp();

    info!(
        agent_id = config.agent_id.as_str(),
        version = AGENT_VERSION,
        "agent starting"
    );

    {
        let bus = bus.clone();
        let config = config.clone();
        let commands_executed = commands_executed.clone();
        tokio::spawn(async move {
            loop {
                if let Err(err) = bus
                    .write_heartbeat(
                        &config.agent_id,
                        AGENT_VERSION,
                        CAPABILITIES,
                        started_at,
                        commands_executed.load(Ordering::Relaxed),
                    )
                    .await
                {
                    warn!("heartbeat write failed: {err}");
                }
                tokio::time::sleep(Duration::from_secs(HEARTBEAT_INTERVAL_SECS)).await;
            }
        });
    }

    let mut pubsub = bus.command_stream(&config.agent_id).await?;
    let mut stream = pubsub.on_message();
    info!(agent_id = config.agent_id.as_str(), "listening for commands");

    while let Some(message) = stream.next().await {
        let payload: String = match message.get_payload() {
            Ok(payload) => payload,
            Err(err) => {
                warn!("unreadable message payload: {err}");
                continue;
            }
        };
        let request: AgentRequest = match serde_json::from_str(&payload) {
            Ok(request) => request,
            Err(err) => {
                warn!("command is not valid JSON: {err}");
                continue;
            }
        };

        let started = Instant::now();
        let (status, output, error) = execute(&config, &request).await;
        commands_executed.fetch_add(1, Ordering::Relaxed);

        let response = AgentResponse {
            command_id: request.command_id,
            status,
            output,
            error,
            execution_time_ms: Some(started.elapsed().as_millis() as i64),
        };
        if let Err(err) = bus.publish_response(&config.agent_id, &response).await {
            error!("response publish failed: {err}");
        }
    }
    Ok(())
}

async fn execute(
    config: &AgentConfig,
    request: &AgentRequest,
) -> (AgentCommandStatus, Option<String>, Option<String>) {
    info!(command = request.command.as_str(), command_id = %request.command_id, "executing");
    match request.command.as_str() {
        "echo" => {
            let text = request
                .params
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("pong");
            (AgentCommandStatus::Success, Some(text.to_string()), None)
        }
        "git_pull" => git_pull(config, request).await,
        "docker_restart" => docker_restart(config, request).await,
        other => (
            AgentCommandStatus::Error,
            None,
            Some(format!("unknown command '{other}'")),
        ),
    }
}

async fn git_pull(
    config: &AgentConfig,
    request: &AgentRequest,
) -> (AgentCommandStatus, Option<String>, Option<String>) {
    let Some(path) = request.params.get("repository_path").and_then(|v| v.as_str()) else {
        return (
            AgentCommandStatus::Error,
            None,
            Some("repository_path is required".into()),
        );
    };
    if !config.git_repo_paths.iter().any(|allowed| allowed == path) {
        return (
            AgentCommandStatus::Error,
            None,
            Some(format!(
                "Repository path not allowed. Configured paths: {}",
                config.git_repo_paths.join(", ")
            )),
        );
    }
    let branch = request
        .params
        .get("branch")
        .and_then(|v| v.as_str())
        .unwrap_or("main");

    let mut command = Command::new("git");
    command.args(["-C", path, "pull", "origin", branch]);
    run_local(&mut command).await
}

async fn docker_restart(
    config: &AgentConfig,
    request: &AgentRequest,
) -> (AgentCommandStatus, Option<String>, Option<String>) {
    let container = request
        .params
        .get("container")
        .and_then(|v| v.as_str())
        .or_else(|| config.docker_containers.first().map(String::as_str));
    let Some(container) = container else {
        return (
            AgentCommandStatus::Error,
            None,
            Some("no container configured".into()),
        );
    };
    if !config.docker_containers.iter().any(|allowed| allowed == container) {
        return (
            AgentCommandStatus::Error,
            None,
            Some(format!(
                "Container name not allowed. Configured names: {}",
                config.docker_containers.join(", ")
            )),
        );
    }

    let mut command = Command::new("docker");
    command.args(["restart", container]);
    run_local(&mut command).await
}

async fn run_local(
    command: &mut Command,
) -> (AgentCommandStatus, Option<String>, Option<String>) {
    match command.output().await {
        Ok(output) if output.status.success() => (
            AgentCommandStatus::Success,
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string()),
            None,
        ),
        Ok(output) => (
            AgentCommandStatus::Error,
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string()),
            Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        ),
        Err(err) => (AgentCommandStatus::Error, None, Some(err.to_string())),
    }
}
