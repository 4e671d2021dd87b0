//! Agent deployment: render agent config templates per device into the
//! deployment path, then optionally activate via the remote agent.

use super::{device_name, DeviceOutcome};
use crate::{agent_service, EngineContext, EngineError};
use cockpit_checkmk::render_device_template;
use cockpit_model::{AgentCommandStatus, JobRun, JobTemplate};
use serde_json::{json, Value};
use std::path::Path;
use tracing::warn;

pub async fn render_device(
    _ctx: &EngineContext,
    template: &JobTemplate,
    device: &Value,
) -> Result<DeviceOutcome, EngineError> {
    let deployment_path = template
        .config_str("deployment_path")
        .ok_or_else(|| EngineError::Validation("deployment_path not configured".into()))?;
    let templates = deploy_templates(template)?;
    if templates.is_empty() {
        return Err(EngineError::Validation("no deploy templates configured".into()));
    }

    let mut written: Vec<String> = Vec::new();
    for entry in &templates {
        let output = render_device_template(&entry.output_path, device);
        if output.trim().is_empty() {
            return Ok(DeviceOutcome::skipped("output path rendered empty"));
        }
        let content = render_device_template(&entry.content, device);
        let target = Path::new(deployment_path).join(output.trim_start_matches('/'));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
        written.push(target.to_string_lossy().to_string());
    }

    Ok(DeviceOutcome::ok(json!({
        "device": device_name(device),
        "files": written,
    })))
}

/// After every device rendered: push the new config to the site agent and
/// bounce its container when activation is requested.
pub async fn finalize_deploy(
    ctx: &EngineContext,
    run: &JobRun,
    template: &JobTemplate,
) -> Result<Value, EngineError> {
    if !template.config_bool("activate_after_deploy").unwrap_or(false) {
        return Ok(json!({"activated": false}));
    }
    let agent_id = template
        .config_str("agent_id")
        .ok_or_else(|| EngineError::Validation("activate_after_deploy needs agent_id".into()))?;
    let repository_path = template
        .config_str("agent_repository_path")
        .or(template.config_str("deployment_path"))
        .ok_or_else(|| EngineError::Validation("no repository path for git_pull".into()))?;
    let branch = template.config_str("agent_branch").unwrap_or("main");

    let pull = agent_service::git_pull(ctx, agent_id, repository_path, branch, &run.started_by).await?;
    if pull.status != AgentCommandStatus::Success {
        warn!(agent_id, "git_pull did not succeed: {:?}", pull.error);
        return Ok(json!({
            "activated": false,
            "git_pull": pull.status.as_str(),
            "error": pull.error,
        }));
    }

    let restart = agent_service::docker_restart(ctx, agent_id, &run.started_by).await?;
    Ok(json!({
        "activated": restart.status == AgentCommandStatus::Success,
        "git_pull": pull.status.as_str(),
        "docker_restart": restart.status.as_str(),
    }))
}

struct DeployTemplate {
    content: String,
    output_path: String,
}

fn deploy_templates(template: &JobTemplate) -> Result<Vec<DeployTemplate>, EngineError> {
    let Some(entries) = template.config.get("deploy_templates") else {
        return Ok(Vec::new());
    };
    let entries = entries
        .as_array()
        .ok_or_else(|| EngineError::Validation("deploy_templates must be a list".into()))?;
    entries
        .iter()
        .map(|entry| {
            let content = entry
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| EngineError::Validation("deploy template missing content".into()))?;
            let output_path = entry
                .get("output_path")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    EngineError::Validation("deploy template missing output_path".into())
                })?;
            Ok(DeployTemplate {
                content: content.to_string(),
                output_path: output_path.to_string(),
            })
        })
        .collect()
}
