//! Worker runtime: blocking-pop consumption over the configured queues,
//! one task at a time, child recycling after a fixed task count, and the
//! chord boundary that closes a run when its last device lands.

use crate::executors;
use crate::reconcile;
use crate::{EngineError, SharedContext};
use chrono::Utc;
use cockpit_broker::{TaskEnvelope, TaskState};
use cockpit_model::{DeviceResult, DeviceResultStatus, JobRun, JobTemplate, RunStatus};
use cockpit_store::StoreError;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

const CONSUME_BLOCK_SECS: f64 = 5.0;

pub struct Worker {
    ctx: SharedContext,
    queues: Vec<String>,
    max_tasks_per_child: u32,
    time_limit: Duration,
}

impl Worker {
    /// Build from the stored worker settings. Without an explicit queue
    /// list the worker subscribes to every configured queue.
    pub async fn from_settings(
        ctx: SharedContext,
        explicit_queues: Option<Vec<String>>,
    ) -> Result<Self, EngineError> {
        let settings = ctx.store.settings().worker().await?;
        let queues = explicit_queues.unwrap_or_else(|| {
            settings
                .queues
                .iter()
                .map(|queue| queue.name.clone())
                .collect()
        });
        Ok(Self {
            ctx,
            queues,
            max_tasks_per_child: settings.max_tasks_per_child.max(1),
            time_limit: Duration::from_secs(settings.task_time_limit_secs.max(1)),
        })
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    pub async fn run(&self) -> Result<(), EngineError> {
        info!(queues = ?self.queues, "worker started");
        loop {
            self.run_child().await?;
            info!(
                tasks = self.max_tasks_per_child,
                "recycling worker child"
            );
        }
    }

    /// One child lifetime: at most `max_tasks_per_child` tasks, then the
    /// caller starts a fresh child to bound leak exposure.
    async fn run_child(&self) -> Result<(), EngineError> {
        let mut handled = 0u32;
        while handled < self.max_tasks_per_child {
            let Some(envelope) = self.ctx.queue.consume(&self.queues, CONSUME_BLOCK_SECS).await?
            else {
                continue;
            };
            handled += 1;
            self.process(envelope).await;
        }
        Ok(())
    }

    async fn process(&self, envelope: TaskEnvelope) {
        let task_id = envelope.task_id;
        if let Err(err) = self
            .ctx
            .results
            .set_state(task_id, TaskState::Started, Value::Null)
            .await
        {
            warn!(%task_id, "result state write failed: {err}");
        }

        let outcome = tokio::time::timeout(self.time_limit, self.handle(&envelope)).await;
        let (state, payload) = match outcome {
            Ok(Ok(payload)) => (TaskState::Success, payload),
            Ok(Err(err)) => {
                error!(task = envelope.task.as_str(), %task_id, "task failed: {err}");
                (TaskState::Failure, json!({"error": digest(&err)}))
            }
            Err(_) => {
                error!(task = envelope.task.as_str(), %task_id, "task hit the time limit");
                (
                    TaskState::Failure,
                    json!({"error": "task time limit exceeded"}),
                )
            }
        };
        if let Err(err) = self.ctx.results.set_state(task_id, state, payload).await {
            warn!(%task_id, "result state write failed: {err}");
        }
    }

    async fn handle(&self, envelope: &TaskEnvelope) -> Result<Value, EngineError> {
        match envelope.task.as_str() {
            "run_device" | "backup_device" => self.handle_device(&envelope.kwargs).await,
            "run_aggregate" | "scan_prefix" => self.handle_aggregate(&envelope.kwargs).await,
            "nb2cmk_run" => self.handle_reconciliation(&envelope.kwargs).await,
            other => Err(EngineError::Validation(format!("unknown task '{other}'"))),
        }
    }

    async fn handle_device(&self, kwargs: &Value) -> Result<Value, EngineError> {
        let (run_id, template) = parse_run_kwargs(kwargs)?;
        let device = kwargs
            .get("device")
            .cloned()
            .ok_or_else(|| EngineError::Validation("task kwargs missing device".into()))?;

        self.ctx.store.runs().mark_running(run_id).await?;
        let run = self
            .ctx
            .store
            .runs()
            .get(run_id)
            .await?
            .ok_or(EngineError::NotFound("job run"))?;

        // The cancel flag is honoured before any device work starts.
        let cancelled = self.ctx.results.is_cancelled(run_id).await?;
        let (status, result, error_message) = if cancelled {
            (
                DeviceResultStatus::Skipped,
                json!({"skipped": "run cancelled"}),
                None,
            )
        } else {
            match executors::execute_device(&self.ctx, &template, &device).await {
                Ok(outcome) => (outcome.status, outcome.result, None),
                Err(err) => (DeviceResultStatus::Error, Value::Null, Some(digest(&err))),
            }
        };

        let device_name = executors::device_name(&device);
        self.ctx
            .store
            .device_results()
            .upsert(&DeviceResult {
                run_id,
                device_name: device_name.clone(),
                device_id: executors::device_id(&device),
                status,
                result,
                error_message,
                processed_at: Utc::now(),
            })
            .await?;

        let processed = self.ctx.results.incr_progress(run_id).await? as u32;
        match self.ctx.store.runs().set_progress(run_id, processed).await {
            // Out-of-order mirror writes and finished races are harmless;
            // the redis counter is the authority.
            Err(StoreError::InvalidProgress { .. }) | Err(StoreError::TerminalRun(_)) => {}
            other => other?,
        }

        if processed >= run.progress.total {
            self.finalize_run(&run, &template).await?;
        }
        Ok(json!({"device": device_name, "status": status.as_str()}))
    }

    /// The task that saw the counter reach the total consolidates the run:
    /// aggregate side effects first, then the write-once terminal status.
    async fn finalize_run(
        &self,
        run: &JobRun,
        template: &JobTemplate,
    ) -> Result<(), EngineError> {
        let cancelled = self.ctx.results.is_cancelled(run.id).await?;
        let counts = self.ctx.store.device_results().status_counts(run.id).await?;

        let mut status = if cancelled {
            RunStatus::Cancelled
        } else {
            counts.terminal_status()
        };
        let mut error = None;
        let mut summary = json!({
            "ok": counts.ok,
            "error": counts.error,
            "skipped": counts.skipped,
        });

        if !cancelled {
            match executors::finalize_job(&self.ctx, run, template).await {
                Ok(Value::Null) => {}
                Ok(extra) => {
                    summary["finalize"] = extra;
                }
                Err(err) => {
                    status = RunStatus::Failed;
                    error = Some(digest(&err));
                }
            }
        }

        match self
            .ctx
            .store
            .runs()
            .finalize(run.id, status, Some(&summary), error.as_deref())
            .await
        {
            // Another task finished the race; the earlier write stands.
            Err(StoreError::TerminalRun(_)) => Ok(()),
            other => other.map_err(EngineError::from),
        }
    }

    async fn handle_aggregate(&self, kwargs: &Value) -> Result<Value, EngineError> {
        let (run_id, template) = parse_run_kwargs(kwargs)?;
        self.ctx.store.runs().mark_running(run_id).await?;
        let run = self
            .ctx
            .store
            .runs()
            .get(run_id)
            .await?
            .ok_or(EngineError::NotFound("job run"))?;

        match executors::execute_aggregate(&self.ctx, &run, &template).await {
            Ok(summary) => {
                let _ = self.ctx.store.runs().set_progress(run_id, 1).await;
                let status = if self.ctx.results.is_cancelled(run_id).await? {
                    RunStatus::Cancelled
                } else {
                    RunStatus::Success
                };
                self.ctx
                    .store
                    .runs()
                    .finalize(run_id, status, Some(&summary), None)
                    .await?;
                Ok(summary)
            }
            Err(err) => {
                let message = digest(&err);
                self.ctx
                    .store
                    .runs()
                    .finalize(run_id, RunStatus::Failed, None, Some(&message))
                    .await?;
                Err(err)
            }
        }
    }

    async fn handle_reconciliation(&self, kwargs: &Value) -> Result<Value, EngineError> {
        let job_id = kwargs
            .get("job_id")
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| EngineError::Validation("task kwargs missing job_id".into()))?;
        let apply = kwargs.get("apply").and_then(Value::as_bool).unwrap_or(false);
        reconcile::run_reconciliation(&self.ctx, job_id, apply).await?;
        Ok(json!({"job_id": job_id, "apply": apply}))
    }
}

fn parse_run_kwargs(kwargs: &Value) -> Result<(Uuid, JobTemplate), EngineError> {
    let run_id = kwargs
        .get("run_id")
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| EngineError::Validation("task kwargs missing run_id".into()))?;
    let template: JobTemplate = kwargs
        .get("template")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|err| EngineError::Validation(format!("task template: {err}")))?
        .ok_or_else(|| EngineError::Validation("task kwargs missing template".into()))?;
    Ok((run_id, template))
}

/// Stack traces do not cross the API; runs record a single-line digest.
fn digest(err: &EngineError) -> String {
    let mut message = err.to_string().replace('\n', " ");
    message.truncate(500);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kwargs_parsing_requires_run_and_template() {
        let template = json!({
            "id": 1, "name": "t", "job_type": "backup",
            "created_by": "admin",
            "created_at": "2025-05-01T08:00:00Z",
            "updated_at": "2025-05-01T08:00:00Z"
        });
        let kwargs = json!({
            "run_id": "4f9e8dcb-5a3e-44c8-93c7-2f26a1a0c9fd",
            "template": template,
        });
        let (run_id, parsed) = parse_run_kwargs(&kwargs).unwrap();
        assert_eq!(run_id.to_string(), "4f9e8dcb-5a3e-44c8-93c7-2f26a1a0c9fd");
        assert_eq!(parsed.name, "t");

        assert!(parse_run_kwargs(&json!({"template": template})).is_err());
        assert!(parse_run_kwargs(&json!({"run_id": "not-a-uuid"})).is_err());
    }

    #[test]
    fn digest_is_single_line_and_bounded() {
        let err = EngineError::Validation(format!("boom\nline two\n{}", "x".repeat(600)));
        let digest = digest(&err);
        assert!(!digest.contains('\n'));
        assert!(digest.len() <= 500);
    }
}
