//! Configuration backup: pull configs over SSH, write them into the git
//! working copy, one commit and push per run.

use super::{device_host, device_id, device_name, resolve_ssh_auth, DeviceOutcome};
use crate::gitrepo::BackupRepo;
use crate::{EngineContext, EngineError};
use chrono::Utc;
use cockpit_checkmk::render_device_template;
use cockpit_model::{JobRun, JobTemplate};
use serde_json::{json, Value};
use tracing::warn;

pub async fn backup_device(
    ctx: &EngineContext,
    template: &JobTemplate,
    device: &Value,
) -> Result<DeviceOutcome, EngineError> {
    let name = device_name(device);
    let Some(host) = device_host(device) else {
        return Ok(DeviceOutcome::skipped("no primary IPv4 address"));
    };
    if device.get("platform").map(Value::is_null).unwrap_or(true) {
        return Ok(DeviceOutcome::skipped("no platform set"));
    }

    let repo = backup_repo(ctx, template).await?;
    let auth = resolve_ssh_auth(ctx, template).await?;
    let connector = ctx.connectors.connect(auth);

    let running = connector.run_command(&host, "show running-config").await?;
    let running = normalize_config(&running);

    let path_template = template
        .config_str("backup_path")
        .unwrap_or("configs/{name}.cfg");
    let relative = render_device_template(path_template, device);
    if relative.trim().is_empty() {
        return Ok(DeviceOutcome::skipped("backup path rendered empty"));
    }
    repo.write_file(&relative, &running).await?;

    let mut written = vec![relative.clone()];
    if template.config_bool("fetch_startup").unwrap_or(false) {
        match connector.run_command(&host, "show startup-config").await {
            Ok(startup) => {
                let startup_path = format!("{relative}.startup");
                repo.write_file(&startup_path, &normalize_config(&startup))
                    .await?;
                written.push(startup_path);
            }
            Err(err) => warn!(device = name.as_str(), "startup-config fetch failed: {err}"),
        }
    }

    if let (Some(field), Some(id)) = (template.config_str("timestamp_custom_field"), device_id(device)) {
        let stamp = json!(Utc::now().to_rfc3339());
        if let Err(err) = ctx.nautobot.set_device_custom_field(&id, field, &stamp).await {
            warn!(device = name.as_str(), "timestamp custom field update failed: {err}");
        }
    }

    Ok(DeviceOutcome::ok(json!({
        "files": written,
        "bytes": running.len(),
    })))
}

/// One commit and push per run, regardless of device count.
pub async fn finalize_backup(
    ctx: &EngineContext,
    run: &JobRun,
    template: &JobTemplate,
) -> Result<Value, EngineError> {
    let repo = backup_repo(ctx, template).await?;
    let committed = repo
        .commit_and_push(format!("Configuration backup run {}", run.id))
        .await?;
    Ok(json!({"committed": committed}))
}

async fn backup_repo(
    ctx: &EngineContext,
    template: &JobTemplate,
) -> Result<BackupRepo, EngineError> {
    let repo_name = template
        .config_str("repository")
        .ok_or_else(|| EngineError::Validation("backup template has no repository".into()))?;
    let record = ctx
        .store
        .git_repositories()
        .get_by_name(repo_name)
        .await?
        .ok_or(EngineError::NotFound("git repository"))?;

    let git_settings = ctx.store.settings().git().await?;
    let author_name = if git_settings.author_name.is_empty() {
        "cockpit".to_string()
    } else {
        git_settings.author_name
    };
    let author_email = if git_settings.author_email.is_empty() {
        "cockpit@localhost".to_string()
    } else {
        git_settings.author_email
    };

    let mut repo = BackupRepo::new(&record.path, &record.branch, author_name, author_email);
    if let Some(credential_name) = record.credential_name.as_deref() {
        if let Some(credential) = ctx
            .store
            .credentials()
            .get_by_name(credential_name, "general")
            .await?
        {
            if let Some(token) = credential.password_encrypted.as_deref() {
                repo = repo.with_token(credential.username.clone(), ctx.vault.decrypt(token)?);
            }
        }
    }
    Ok(repo)
}

/// Strip device noise around the configuration body: terminal banners,
/// "Building configuration" headers and trailing whitespace.
fn normalize_config(raw: &str) -> String {
    let mut lines: Vec<&str> = raw
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !(trimmed.starts_with("Building configuration")
                || trimmed.starts_with("Current configuration")
                || trimmed.starts_with("Using ") && trimmed.ends_with("bytes"))
        })
        .collect();
    while lines.first().map(|l| l.trim().is_empty()).unwrap_or(false) {
        lines.remove(0);
    }
    while lines.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
        lines.pop();
    }
    let mut body = lines.join("\n");
    body.push('\n');
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_lines_are_stripped() {
        let raw = "\nBuilding configuration...\n\nCurrent configuration : 1834 bytes\nhostname r1\n!\nend\n\n\n";
        assert_eq!(normalize_config(raw), "hostname r1\n!\nend\n");
    }

    #[test]
    fn plain_config_is_preserved() {
        let raw = "hostname r1\ninterface Ethernet1\n no shutdown\n";
        assert_eq!(normalize_config(raw), raw);
    }
}
