//! Nautobot-to-CheckMK reconciliation. Per device:
//!
//! ```text
//!   fetch -> normalise -> get host -> compare -> equal | diff
//!                |            |
//!              error     host_not_found
//! ```
//!
//! Sync mode converges the host (add / update / move); compare mode only
//! reports. Per-device failures land in the job results, the aggregate job
//! completes regardless.

use crate::{EngineContext, EngineError};
use chrono::Utc;
use cockpit_checkmk::{compare_host, normalize_device, CheckMkError, SnmpMapping};
use cockpit_model::{CheckMkSettings, ComparisonOutcome, Nb2CmkJobResult, Nb2CmkJobStatus};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

pub struct ReconcileSettings {
    pub checkmk: CheckMkSettings,
    pub snmp_mapping: Option<SnmpMapping>,
}

impl ReconcileSettings {
    pub async fn load(ctx: &EngineContext) -> Result<Self, EngineError> {
        let checkmk = ctx.store.settings().checkmk().await?;
        let snmp_mapping = match checkmk.snmp_mapping_path.as_deref() {
            Some(path) => match SnmpMapping::load(Path::new(path)) {
                Ok(mapping) => Some(mapping),
                Err(err) => {
                    warn!("snmp mapping unavailable: {err}");
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            checkmk,
            snmp_mapping,
        })
    }
}

/// Compare one device against its CheckMK host. Never fails; failures are
/// an outcome.
pub async fn compare_device(
    ctx: &EngineContext,
    settings: &ReconcileSettings,
    device: &Value,
) -> (ComparisonOutcome, Value) {
    let desired = match normalize_device(device, &settings.checkmk, settings.snmp_mapping.as_ref())
    {
        Ok(desired) => desired,
        Err(err) => return (ComparisonOutcome::Error, json!({"error": err.to_string()})),
    };

    match ctx.checkmk.get_host(&desired.hostname).await {
        Ok(host) => {
            let (outcome, differences) = compare_host(
                &desired,
                &host.folder,
                &host.attributes,
                &settings.checkmk.ignore_attributes,
            );
            (outcome, json!({"differences": differences}))
        }
        Err(CheckMkError::HostNotFound(_)) => (
            ComparisonOutcome::HostNotFound,
            json!({"folder": desired.folder}),
        ),
        Err(err) => (ComparisonOutcome::Error, json!({"error": err.to_string()})),
    }
}

/// Converge one device: create the host when absent, patch attributes and
/// move folders when they differ. A stale ETag is re-fetched once.
pub async fn sync_device(
    ctx: &EngineContext,
    settings: &ReconcileSettings,
    device: &Value,
) -> (ComparisonOutcome, Value) {
    let desired = match normalize_device(device, &settings.checkmk, settings.snmp_mapping.as_ref())
    {
        Ok(desired) => desired,
        Err(err) => return (ComparisonOutcome::Error, json!({"error": err.to_string()})),
    };

    let host = match ctx.checkmk.get_host(&desired.hostname).await {
        Ok(host) => host,
        Err(CheckMkError::HostNotFound(_)) => {
            return match ctx
                .checkmk
                .create_host(&desired.hostname, &desired.folder, &desired.attributes)
                .await
            {
                Ok(()) => (
                    ComparisonOutcome::HostNotFound,
                    json!({"action": "add", "folder": desired.folder}),
                ),
                Err(err) => (ComparisonOutcome::Error, json!({"error": err.to_string()})),
            };
        }
        Err(err) => return (ComparisonOutcome::Error, json!({"error": err.to_string()})),
    };

    let (outcome, differences) = compare_host(
        &desired,
        &host.folder,
        &host.attributes,
        &settings.checkmk.ignore_attributes,
    );
    if outcome == ComparisonOutcome::Equal {
        return (outcome, json!({"action": "none"}));
    }

    let mut actions: Vec<&str> = Vec::new();
    let mut etag = host.etag.clone().unwrap_or_else(|| "*".into());

    if cockpit_checkmk::normalize_folder_path(&desired.folder)
        != cockpit_checkmk::normalize_folder_path(&host.folder)
    {
        if let Err(err) = move_with_retry(ctx, &desired.hostname, &etag, &desired.folder).await {
            return (ComparisonOutcome::Error, json!({"error": err.to_string()}));
        }
        actions.push("move");
        // The move invalidates the ETag; fetch a fresh one for the patch.
        match ctx.checkmk.get_host(&desired.hostname).await {
            Ok(moved) => etag = moved.etag.unwrap_or_else(|| "*".into()),
            Err(err) => {
                return (ComparisonOutcome::Error, json!({"error": err.to_string()}))
            }
        }
    }

    match update_with_retry(ctx, &desired.hostname, &etag, &desired.attributes).await {
        Ok(()) => actions.push("update"),
        Err(err) => return (ComparisonOutcome::Error, json!({"error": err.to_string()})),
    }

    (
        ComparisonOutcome::Diff,
        json!({"action": actions, "differences": differences}),
    )
}

async fn update_with_retry(
    ctx: &EngineContext,
    hostname: &str,
    etag: &str,
    attributes: &serde_json::Map<String, Value>,
) -> Result<(), EngineError> {
    match ctx.checkmk.update_host(hostname, etag, attributes).await {
        Err(CheckMkError::StaleEtag(_)) => {
            let fresh = ctx.checkmk.get_host(hostname).await?;
            let etag = fresh.etag.unwrap_or_else(|| "*".into());
            ctx.checkmk.update_host(hostname, &etag, attributes).await?;
            Ok(())
        }
        other => Ok(other?),
    }
}

async fn move_with_retry(
    ctx: &EngineContext,
    hostname: &str,
    etag: &str,
    folder: &str,
) -> Result<(), EngineError> {
    match ctx.checkmk.move_host(hostname, etag, folder).await {
        Err(CheckMkError::StaleEtag(_)) => {
            let fresh = ctx.checkmk.get_host(hostname).await?;
            let etag = fresh.etag.unwrap_or_else(|| "*".into());
            ctx.checkmk.move_host(hostname, &etag, folder).await?;
            Ok(())
        }
        other => Ok(other?),
    }
}

/// Background reconciliation over the whole device fleet. Progress is
/// observable by polling; per-device outcomes are persisted as they land.
pub async fn run_reconciliation(
    ctx: &EngineContext,
    job_id: Uuid,
    apply: bool,
) -> Result<(), EngineError> {
    ctx.store
        .nb2cmk()
        .set_status(job_id, Nb2CmkJobStatus::Running, None)
        .await?;

    let settings = match ReconcileSettings::load(ctx).await {
        Ok(settings) => settings,
        Err(err) => {
            ctx.store
                .nb2cmk()
                .set_status(job_id, Nb2CmkJobStatus::Failed, Some(&err.to_string()))
                .await?;
            return Err(err);
        }
    };

    let devices = match ctx.nautobot.list_devices().await {
        Ok(devices) => devices,
        Err(err) => {
            ctx.store
                .nb2cmk()
                .set_status(job_id, Nb2CmkJobStatus::Failed, Some(&err.to_string()))
                .await?;
            return Err(err.into());
        }
    };
    ctx.store
        .nb2cmk()
        .set_total(job_id, devices.len() as u32)
        .await?;

    for (index, device) in devices.iter().enumerate() {
        let device_name = device
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("(unnamed)")
            .to_string();
        let (outcome, detail) = if apply {
            sync_device(ctx, &settings, device).await
        } else {
            compare_device(ctx, &settings, device).await
        };
        ctx.store
            .nb2cmk()
            .add_result(&Nb2CmkJobResult {
                job_id,
                device_name,
                outcome,
                detail,
                processed_at: Utc::now(),
            })
            .await?;
        ctx.store
            .nb2cmk()
            .set_progress(job_id, (index + 1) as u32)
            .await?;
    }

    ctx.store
        .nb2cmk()
        .set_status(job_id, Nb2CmkJobStatus::Completed, None)
        .await?;
    info!(%job_id, devices = devices.len(), apply, "reconciliation complete");
    Ok(())
}
