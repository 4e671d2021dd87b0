//! Run dispatch: template to device set to queued tasks, and the terminal
//! bookkeeping shared by every job type.

use crate::conditions;
use crate::{EngineError, SharedContext};
use cockpit_model::{InventorySource, JobRun, JobTemplate, JobType, RunStatus};
use cockpit_store::NewRun;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

pub struct JobDispatcher {
    ctx: SharedContext,
}

impl JobDispatcher {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }

    /// Materialise a Run from a template and fan its tasks out onto the
    /// broker.
    pub async fn start_run(
        &self,
        template_id: i64,
        started_by: &str,
        overrides: Option<Value>,
    ) -> Result<JobRun, EngineError> {
        let mut template = self
            .ctx
            .store
            .templates()
            .get(template_id)
            .await?
            .ok_or(EngineError::NotFound("job template"))?;
        if let Some(overrides) = overrides {
            merge_config(&mut template.config, &overrides);
        }
        validate_template(&template)?;

        if template.no_overlap {
            let active = self
                .ctx
                .store
                .runs()
                .active_count_for_template(template.id)
                .await?;
            if active > 0 {
                return Err(EngineError::OverlapRefused(template.id));
            }
        }

        let devices = self.resolve_devices(&template, started_by).await?;
        let run = match task_shape(template.job_type) {
            TaskShape::PerDevice => self.dispatch_per_device(&template, started_by, devices).await?,
            TaskShape::Aggregate => self.dispatch_aggregate(&template, started_by).await?,
        };

        info!(
            run_id = %run.id,
            template = template.name.as_str(),
            devices = run.progress.total,
            "run dispatched"
        );
        Ok(run)
    }

    /// Cooperative cancellation: flag in the result store, observed by
    /// workers between devices.
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<(), EngineError> {
        let run = self
            .ctx
            .store
            .runs()
            .get(run_id)
            .await?
            .ok_or(EngineError::NotFound("job run"))?;
        if run.status.is_terminal() {
            return Ok(());
        }
        self.ctx.results.request_cancel(run_id).await?;
        Ok(())
    }

    async fn resolve_devices(
        &self,
        template: &JobTemplate,
        started_by: &str,
    ) -> Result<Vec<Value>, EngineError> {
        if !task_shape(template.job_type).needs_devices() {
            return Ok(Vec::new());
        }
        let all = self.ctx.nautobot.list_devices().await?;
        match template.inventory_source {
            InventorySource::All => Ok(all),
            InventorySource::Inventory => {
                let name = template
                    .inventory_name
                    .as_deref()
                    .ok_or_else(|| EngineError::Validation("inventory name not set".into()))?;
                let inventory = self
                    .ctx
                    .store
                    .inventories()
                    .resolve(name, started_by)
                    .await?
                    .ok_or(EngineError::NotFound("inventory"))?;
                Ok(conditions::filter_devices(&inventory.conditions, &all)
                    .into_iter()
                    .cloned()
                    .collect())
            }
        }
    }

    async fn dispatch_per_device(
        &self,
        template: &JobTemplate,
        started_by: &str,
        devices: Vec<Value>,
    ) -> Result<JobRun, EngineError> {
        let run = self
            .ctx
            .store
            .runs()
            .create(NewRun {
                id: Uuid::new_v4(),
                template_id: Some(template.id),
                job_type: template.job_type,
                started_by: started_by.to_string(),
                total: devices.len() as u32,
                metadata: json!({"template": template}),
            })
            .await?;

        if devices.is_empty() {
            // Nothing to do; close the run instead of leaving it pending.
            self.ctx
                .store
                .runs()
                .finalize(run.id, RunStatus::Success, Some(&json!({"devices": 0})), None)
                .await?;
            return Ok(self
                .ctx
                .store
                .runs()
                .get(run.id)
                .await?
                .ok_or(EngineError::NotFound("job run"))?);
        }

        let task_name = per_device_task(template.job_type);
        for device in devices {
            self.ctx
                .queue
                .publish(
                    task_name,
                    json!({
                        "run_id": run.id,
                        "template": template,
                        "device": device,
                    }),
                    None,
                )
                .await?;
        }
        Ok(run)
    }

    async fn dispatch_aggregate(
        &self,
        template: &JobTemplate,
        started_by: &str,
    ) -> Result<JobRun, EngineError> {
        let run = self
            .ctx
            .store
            .runs()
            .create(NewRun {
                id: Uuid::new_v4(),
                template_id: Some(template.id),
                job_type: template.job_type,
                started_by: started_by.to_string(),
                total: 1,
                metadata: json!({"template": template}),
            })
            .await?;

        let task_name = match template.job_type {
            JobType::ScanPrefixes => "scan_prefix",
            _ => "run_aggregate",
        };
        self.ctx
            .queue
            .publish(
                task_name,
                json!({"run_id": run.id, "template": template}),
                None,
            )
            .await?;
        Ok(run)
    }
}

enum TaskShape {
    PerDevice,
    Aggregate,
}

impl TaskShape {
    fn needs_devices(&self) -> bool {
        matches!(self, TaskShape::PerDevice)
    }
}

fn task_shape(job_type: JobType) -> TaskShape {
    match job_type {
        JobType::Backup
        | JobType::RunCommands
        | JobType::SyncDevices
        | JobType::CompareDevices
        | JobType::DeployAgent => TaskShape::PerDevice,
        JobType::ScanPrefixes | JobType::IpAddresses => TaskShape::Aggregate,
    }
}

fn per_device_task(job_type: JobType) -> &'static str {
    match job_type {
        JobType::Backup => "backup_device",
        _ => "run_device",
    }
}

/// Shallow key merge of request overrides into the template config.
fn merge_config(config: &mut Value, overrides: &Value) {
    let (Some(config), Some(overrides)) = (config.as_object_mut(), overrides.as_object()) else {
        return;
    };
    for (key, value) in overrides {
        config.insert(key.clone(), value.clone());
    }
}

fn validate_template(template: &JobTemplate) -> Result<(), EngineError> {
    match template.job_type {
        // The reachable-IP policy differs across deployments; an explicit
        // template value is required, an unset flag rejects the run.
        JobType::ScanPrefixes => {
            if template.config_bool("set_reachable_active").is_none() {
                return Err(EngineError::Validation(
                    "scan_prefixes requires set_reachable_active to be set".into(),
                ));
            }
            Ok(())
        }
        JobType::IpAddresses => {
            let field = template.config_str("ip_filter_field").unwrap_or_default();
            let value = template.config_str("ip_filter_value").unwrap_or_default();
            if field.is_empty() || value.is_empty() {
                return Err(EngineError::Validation(
                    "ip_addresses requires ip_filter_field and ip_filter_value".into(),
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
