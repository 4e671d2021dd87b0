//! sync_devices / compare_devices: the reconciliation engine driven as a
//! per-device job.

use super::DeviceOutcome;
use crate::reconcile::{self, ReconcileSettings};
use crate::{EngineContext, EngineError};
use cockpit_model::{ComparisonOutcome, DeviceResultStatus, JobTemplate};
use serde_json::{json, Value};

pub async fn sync_device(
    ctx: &EngineContext,
    device: &Value,
) -> Result<DeviceOutcome, EngineError> {
    let settings = ReconcileSettings::load(ctx).await?;
    let (outcome, detail) = reconcile::sync_device(ctx, &settings, device).await;
    Ok(outcome_to_result(outcome, detail))
}

pub async fn compare_device(
    ctx: &EngineContext,
    device: &Value,
) -> Result<DeviceOutcome, EngineError> {
    let settings = ReconcileSettings::load(ctx).await?;
    let (outcome, detail) = reconcile::compare_device(ctx, &settings, device).await;
    Ok(outcome_to_result(outcome, detail))
}

pub async fn finalize_sync(
    ctx: &EngineContext,
    template: &JobTemplate,
) -> Result<Value, EngineError> {
    if template
        .config_bool("activate_changes_after_sync")
        .unwrap_or(false)
    {
        ctx.checkmk.activate_changes().await?;
        return Ok(json!({"activated": true}));
    }
    Ok(json!({"activated": false}))
}

fn outcome_to_result(outcome: ComparisonOutcome, detail: Value) -> DeviceOutcome {
    let status = match outcome {
        ComparisonOutcome::Error => DeviceResultStatus::Error,
        _ => DeviceResultStatus::Ok,
    };
    DeviceOutcome {
        status,
        result: json!({"outcome": outcome.as_str(), "detail": detail}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_device_statuses() {
        let ok = outcome_to_result(ComparisonOutcome::Equal, json!({}));
        assert_eq!(ok.status, DeviceResultStatus::Ok);
        assert_eq!(ok.result["outcome"], "equal");

        let err = outcome_to_result(ComparisonOutcome::Error, json!({"error": "boom"}));
        assert_eq!(err.status, DeviceResultStatus::Error);
    }
}
