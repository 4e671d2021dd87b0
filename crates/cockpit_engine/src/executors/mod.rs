//! Per-job-type execution logic. Each per-device executor turns one device
//! into a [`DeviceOutcome`]; aggregate executors own their whole run.

mod backup;
mod deploy_agent;
mod ip_addresses;
mod ping;
mod run_commands;
mod scan_prefixes;
mod sync_devices;

pub use ping::{ping_address, PingOptions};

use crate::{EngineContext, EngineError};
use cockpit_device::SshAuth;
use cockpit_model::{CredentialKind, DeviceResultStatus, JobRun, JobTemplate, JobType};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct DeviceOutcome {
    pub status: DeviceResultStatus,
    pub result: Value,
}

impl DeviceOutcome {
    pub fn ok(result: Value) -> Self {
        Self {
            status: DeviceResultStatus::Ok,
            result,
        }
    }

    /// Unresolvable preconditions degrade to skipped, not error.
    pub fn skipped(reason: &str) -> Self {
        Self {
            status: DeviceResultStatus::Skipped,
            result: serde_json::json!({"skipped": reason}),
        }
    }
}

pub async fn execute_device(
    ctx: &EngineContext,
    template: &JobTemplate,
    device: &Value,
) -> Result<DeviceOutcome, EngineError> {
    match template.job_type {
        JobType::Backup => backup::backup_device(ctx, template, device).await,
        JobType::RunCommands => run_commands::run_commands_device(ctx, template, device).await,
        JobType::SyncDevices => sync_devices::sync_device(ctx, device).await,
        JobType::CompareDevices => sync_devices::compare_device(ctx, device).await,
        JobType::DeployAgent => deploy_agent::render_device(ctx, template, device).await,
        other => Err(EngineError::Validation(format!(
            "job type {other} is not a per-device job"
        ))),
    }
}

/// Aggregate side effects committed once per run by the finishing task.
pub async fn finalize_job(
    ctx: &EngineContext,
    run: &JobRun,
    template: &JobTemplate,
) -> Result<Value, EngineError> {
    match template.job_type {
        JobType::Backup => backup::finalize_backup(ctx, run, template).await,
        JobType::SyncDevices => sync_devices::finalize_sync(ctx, template).await,
        JobType::DeployAgent => deploy_agent::finalize_deploy(ctx, run, template).await,
        _ => Ok(Value::Null),
    }
}

/// Jobs that are not a per-device fan-out: one orchestrator task owns the
/// whole run.
pub async fn execute_aggregate(
    ctx: &EngineContext,
    run: &JobRun,
    template: &JobTemplate,
) -> Result<Value, EngineError> {
    match template.job_type {
        JobType::IpAddresses => ip_addresses::execute(ctx, run, template).await,
        JobType::ScanPrefixes => scan_prefixes::execute(ctx, run, template).await,
        other => Err(EngineError::Validation(format!(
            "job type {other} is not an aggregate job"
        ))),
    }
}

/// Resolve the template's credential into SSH auth material. Decryption
/// happens here, at task time, never at dispatch.
pub async fn resolve_ssh_auth(
    ctx: &EngineContext,
    template: &JobTemplate,
) -> Result<SshAuth, EngineError> {
    let credential_id = template
        .credential_id
        .ok_or_else(|| EngineError::Validation("template has no credential".into()))?;
    let record = ctx
        .store
        .credentials()
        .get(credential_id)
        .await?
        .ok_or(EngineError::NotFound("credential"))?;

    match record.kind {
        CredentialKind::SshKey => {
            let key_token = record.ssh_key_encrypted.as_deref().ok_or_else(|| {
                EngineError::Validation(format!("credential '{}' has no ssh key", record.name))
            })?;
            let private_key = ctx.vault.decrypt(key_token)?;
            let passphrase = record
                .passphrase_encrypted
                .as_deref()
                .map(|token| ctx.vault.decrypt(token))
                .transpose()?;
            Ok(SshAuth::Key {
                username: record.username,
                private_key,
                passphrase,
            })
        }
        _ => {
            let password_token = record.password_encrypted.as_deref().ok_or_else(|| {
                EngineError::Validation(format!("credential '{}' has no password", record.name))
            })?;
            let password = ctx.vault.decrypt(password_token)?;
            Ok(SshAuth::Password {
                username: record.username,
                password,
            })
        }
    }
}

/// Management address for SSH: the primary IPv4 with its prefix length
/// stripped.
pub fn device_host(device: &Value) -> Option<String> {
    device
        .get("primary_ip4")
        .and_then(|ip| ip.get("address"))
        .and_then(Value::as_str)
        .map(|address| address.split('/').next().unwrap_or(address).to_string())
}

pub fn device_name(device: &Value) -> String {
    device
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("(unnamed)")
        .to_string()
}

pub fn device_id(device: &Value) -> Option<String> {
    device
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
}
