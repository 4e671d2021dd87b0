use crate::error::StoreError;
use chrono::{DateTime, Utc};
use cockpit_model::{
    DeviceResult, DeviceResultStatus, InventorySource, JobRun, JobSchedule, JobTemplate, JobType,
    Progress, RunStatus,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

pub struct JobTemplateRepo<'a> {
    pool: &'a SqlitePool,
}

#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub job_type: JobType,
    pub inventory_source: InventorySource,
    pub inventory_name: Option<String>,
    pub credential_id: Option<i64>,
    pub is_global: bool,
    pub no_overlap: bool,
    pub config: serde_json::Value,
    pub created_by: String,
}

impl<'a> JobTemplateRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewTemplate) -> Result<JobTemplate, StoreError> {
        let now = Utc::now();
        let inventory_source = match new.inventory_source {
            InventorySource::All => "all",
            InventorySource::Inventory => "inventory",
        };
        let result = sqlx::query(
            "INSERT INTO job_templates \
             (name, job_type, inventory_source, inventory_name, credential_id, is_global, \
              no_overlap, config, created_by, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        )
        .bind(&new.name)
        .bind(new.job_type.as_str())
        .bind(inventory_source)
        .bind(&new.inventory_name)
        .bind(new.credential_id)
        .bind(new.is_global)
        .bind(new.no_overlap)
        .bind(new.config.to_string())
        .bind(&new.created_by)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("template '{}' already exists", new.name))
            }
            other => StoreError::Sqlx(other),
        })?;

        self.get(result.last_insert_rowid())
            .await?
            .ok_or(StoreError::NotFound("job template"))
    }

    pub async fn get(&self, id: i64) -> Result<Option<JobTemplate>, StoreError> {
        let row = sqlx::query("SELECT * FROM job_templates WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_template).transpose()
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<JobTemplate>, StoreError> {
        let row = sqlx::query("SELECT * FROM job_templates WHERE name = ?1")
            .bind(name)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_template).transpose()
    }

    /// Templates visible to a user: global ones plus their own.
    pub async fn list_visible(&self, username: &str) -> Result<Vec<JobTemplate>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM job_templates WHERE is_global = 1 OR created_by = ?1 ORDER BY name",
        )
        .bind(username)
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(row_to_template).collect()
    }

    pub async fn update_config(
        &self,
        id: i64,
        config: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE job_templates SET config = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(id)
                .bind(config.to_string())
                .bind(Utc::now())
                .execute(self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("job template"));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM job_templates WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("job template"));
        }
        Ok(())
    }
}

pub struct JobScheduleRepo<'a> {
    pool: &'a SqlitePool,
}

impl<'a> JobScheduleRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        template_id: i64,
        cron: &str,
        enabled: bool,
        credential_id: Option<i64>,
    ) -> Result<JobSchedule, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO job_schedules (template_id, cron, enabled, credential_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(template_id)
        .bind(cron)
        .bind(enabled)
        .bind(credential_id)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(JobSchedule {
            id: result.last_insert_rowid(),
            template_id,
            cron: cron.to_string(),
            enabled,
            credential_id,
            created_at: now,
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<JobSchedule>, StoreError> {
        let row = sqlx::query("SELECT * FROM job_schedules WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_schedule).transpose()
    }

    pub async fn list_enabled(&self) -> Result<Vec<JobSchedule>, StoreError> {
        let rows = sqlx::query("SELECT * FROM job_schedules WHERE enabled = 1 ORDER BY id")
            .fetch_all(self.pool)
            .await?;
        rows.iter().map(row_to_schedule).collect()
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE job_schedules SET enabled = ?2 WHERE id = ?1")
            .bind(id)
            .bind(enabled)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("job schedule"));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM job_schedules WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

pub struct JobRunRepo<'a> {
    pool: &'a SqlitePool,
}

#[derive(Debug, Clone)]
pub struct NewRun {
    pub id: Uuid,
    pub template_id: Option<i64>,
    pub job_type: JobType,
    pub started_by: String,
    pub total: u32,
    pub metadata: serde_json::Value,
}

impl<'a> JobRunRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewRun) -> Result<JobRun, StoreError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO job_runs (id, template_id, job_type, status, started_by, started_at, \
             processed, total, metadata) VALUES (?1, ?2, ?3, 'pending', ?4, ?5, 0, ?6, ?7)",
        )
        .bind(new.id.to_string())
        .bind(new.template_id)
        .bind(new.job_type.as_str())
        .bind(&new.started_by)
        .bind(now)
        .bind(new.total)
        .bind(new.metadata.to_string())
        .execute(self.pool)
        .await?;

        self.get(new.id).await?.ok_or(StoreError::NotFound("job run"))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<JobRun>, StoreError> {
        let row = sqlx::query("SELECT * FROM job_runs WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_run).transpose()
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<JobRun>, StoreError> {
        let rows = sqlx::query("SELECT * FROM job_runs ORDER BY started_at DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        rows.iter().map(row_to_run).collect()
    }

    /// pending -> running; a no-op when another worker got there first.
    pub async fn mark_running(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE job_runs SET status = 'running' WHERE id = ?1 AND status = 'pending'")
            .bind(id.to_string())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Progress writes are monotonic, bounded by total, and refused once the
    /// run is terminal.
    pub async fn set_progress(&self, id: Uuid, processed: u32) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE job_runs SET processed = ?2 WHERE id = ?1 \
             AND status IN ('pending', 'running') AND ?2 >= processed AND ?2 <= total",
        )
        .bind(id.to_string())
        .bind(processed)
        .execute(self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.get(id).await? {
            None => Err(StoreError::NotFound("job run")),
            Some(run) if run.status.is_terminal() => Err(StoreError::TerminalRun(id)),
            Some(run) => Err(StoreError::InvalidProgress {
                run: id,
                processed,
                total: run.progress.total,
            }),
        }
    }

    /// Write-once transition into a terminal state.
    pub async fn finalize(
        &self,
        id: Uuid,
        status: RunStatus,
        result_summary: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        debug_assert!(status.is_terminal());
        let result = sqlx::query(
            "UPDATE job_runs SET status = ?2, completed_at = ?3, result_summary = ?4, error = ?5 \
             WHERE id = ?1 AND status IN ('pending', 'running')",
        )
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(result_summary.map(|v| v.to_string()))
        .bind(error)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                None => Err(StoreError::NotFound("job run")),
                Some(_) => Err(StoreError::TerminalRun(id)),
            };
        }
        Ok(())
    }

    /// Runs of a template still pending or running — the no-overlap check.
    pub async fn active_count_for_template(&self, template_id: i64) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM job_runs \
             WHERE template_id = ?1 AND status IN ('pending', 'running')",
        )
        .bind(template_id)
        .fetch_one(self.pool)
        .await?;
        Ok(row.try_get("n")?)
    }
}

pub struct DeviceResultRepo<'a> {
    pool: &'a SqlitePool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub ok: u32,
    pub error: u32,
    pub skipped: u32,
}

impl StatusCounts {
    /// Terminal status of the owning run: success when nothing failed,
    /// partial on a mix, failed when no device succeeded.
    pub fn terminal_status(&self) -> RunStatus {
        if self.error == 0 {
            RunStatus::Success
        } else if self.ok > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }
}

impl<'a> DeviceResultRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, result: &DeviceResult) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO device_results \
             (run_id, device_name, device_id, status, result, error_message, processed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT (run_id, device_name) DO UPDATE SET \
             device_id = excluded.device_id, status = excluded.status, \
             result = excluded.result, error_message = excluded.error_message, \
             processed_at = excluded.processed_at",
        )
        .bind(result.run_id.to_string())
        .bind(&result.device_name)
        .bind(&result.device_id)
        .bind(result.status.as_str())
        .bind(result.result.to_string())
        .bind(&result.error_message)
        .bind(result.processed_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_by_run(&self, run_id: Uuid) -> Result<Vec<DeviceResult>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM device_results WHERE run_id = ?1 ORDER BY device_name",
        )
        .bind(run_id.to_string())
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(row_to_device_result).collect()
    }

    pub async fn status_counts(&self, run_id: Uuid) -> Result<StatusCounts, StoreError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM device_results WHERE run_id = ?1 GROUP BY status",
        )
        .bind(run_id.to_string())
        .fetch_all(self.pool)
        .await?;
        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            match status.as_str() {
                "ok" => counts.ok = n as u32,
                "error" => counts.error = n as u32,
                "skipped" => counts.skipped = n as u32,
                other => return Err(StoreError::decode(format!("device status '{other}'"))),
            }
        }
        Ok(counts)
    }
}

fn row_to_template(row: &SqliteRow) -> Result<JobTemplate, StoreError> {
    let job_type: String = row.try_get("job_type")?;
    let inventory_source: String = row.try_get("inventory_source")?;
    let config: String = row.try_get("config")?;
    Ok(JobTemplate {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        job_type: JobType::from_str(&job_type).map_err(StoreError::decode)?,
        inventory_source: match inventory_source.as_str() {
            "inventory" => InventorySource::Inventory,
            _ => InventorySource::All,
        },
        inventory_name: row.try_get("inventory_name")?,
        credential_id: row.try_get("credential_id")?,
        is_global: row.try_get("is_global")?,
        no_overlap: row.try_get("no_overlap")?,
        config: serde_json::from_str(&config).map_err(StoreError::decode)?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_schedule(row: &SqliteRow) -> Result<JobSchedule, StoreError> {
    Ok(JobSchedule {
        id: row.try_get("id")?,
        template_id: row.try_get("template_id")?,
        cron: row.try_get("cron")?,
        enabled: row.try_get("enabled")?,
        credential_id: row.try_get("credential_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_run(row: &SqliteRow) -> Result<JobRun, StoreError> {
    let id: String = row.try_get("id")?;
    let job_type: String = row.try_get("job_type")?;
    let status: String = row.try_get("status")?;
    let result_summary: Option<String> = row.try_get("result_summary")?;
    let metadata: String = row.try_get("metadata")?;
    Ok(JobRun {
        id: Uuid::parse_str(&id).map_err(StoreError::decode)?,
        template_id: row.try_get("template_id")?,
        job_type: JobType::from_str(&job_type).map_err(StoreError::decode)?,
        status: RunStatus::from_str(&status).map_err(StoreError::decode)?,
        started_by: row.try_get("started_by")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
        progress: Progress {
            processed: row.try_get::<i64, _>("processed")? as u32,
            total: row.try_get::<i64, _>("total")? as u32,
        },
        result_summary: result_summary
            .map(|raw| serde_json::from_str(&raw).map_err(StoreError::decode))
            .transpose()?,
        error: row.try_get("error")?,
        metadata: serde_json::from_str(&metadata).map_err(StoreError::decode)?,
    })
}

fn row_to_device_result(row: &SqliteRow) -> Result<DeviceResult, StoreError> {
    let run_id: String = row.try_get("run_id")?;
    let status: String = row.try_get("status")?;
    let result: String = row.try_get("result")?;
    Ok(DeviceResult {
        run_id: Uuid::parse_str(&run_id).map_err(StoreError::decode)?,
        device_name: row.try_get("device_name")?,
        device_id: row.try_get("device_id")?,
        status: DeviceResultStatus::from_str(&status).map_err(StoreError::decode)?,
        result: serde_json::from_str(&result).map_err(StoreError::decode)?,
        error_message: row.try_get("error_message")?,
        processed_at: row.try_get("processed_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use serde_json::json;

    async fn seeded_store() -> Store {
        let store = Store::connect_memory().await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn new_run(total: u32) -> NewRun {
        NewRun {
            id: Uuid::new_v4(),
            template_id: None,
            job_type: JobType::Backup,
            started_by: "tester".into(),
            total,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn run_lifecycle_happy_path() {
        let store = seeded_store().await;
        let run = store.runs().create(new_run(2)).await.unwrap();
        assert_eq!(run.status, RunStatus::Pending);

        store.runs().mark_running(run.id).await.unwrap();
        store.runs().set_progress(run.id, 1).await.unwrap();
        store.runs().set_progress(run.id, 2).await.unwrap();
        store
            .runs()
            .finalize(run.id, RunStatus::Success, Some(&json!({"ok": 2})), None)
            .await
            .unwrap();

        let done = store.runs().get(run.id).await.unwrap().unwrap();
        assert_eq!(done.status, RunStatus::Success);
        assert!(done.completed_at.is_some());
        assert_eq!(done.progress.processed, 2);
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_bounded() {
        let store = seeded_store().await;
        let run = store.runs().create(new_run(3)).await.unwrap();

        store.runs().set_progress(run.id, 2).await.unwrap();
        // Regression refused.
        assert!(matches!(
            store.runs().set_progress(run.id, 1).await,
            Err(StoreError::InvalidProgress { .. })
        ));
        // Exceeding total refused.
        assert!(matches!(
            store.runs().set_progress(run.id, 4).await,
            Err(StoreError::InvalidProgress { .. })
        ));
        // Idempotent re-write of the same value is fine.
        store.runs().set_progress(run.id, 2).await.unwrap();
    }

    #[tokio::test]
    async fn terminal_runs_are_immutable() {
        let store = seeded_store().await;
        let run = store.runs().create(new_run(1)).await.unwrap();
        store
            .runs()
            .finalize(run.id, RunStatus::Cancelled, None, None)
            .await
            .unwrap();

        assert!(matches!(
            store.runs().set_progress(run.id, 1).await,
            Err(StoreError::TerminalRun(_))
        ));
        assert!(matches!(
            store
                .runs()
                .finalize(run.id, RunStatus::Success, None, None)
                .await,
            Err(StoreError::TerminalRun(_))
        ));

        let unchanged = store.runs().get(run.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, RunStatus::Cancelled);
        assert_eq!(unchanged.progress.processed, 0);
    }

    #[tokio::test]
    async fn device_result_upsert_and_terminal_status() {
        let store = seeded_store().await;
        let run = store.runs().create(new_run(3)).await.unwrap();

        for (name, status) in [
            ("r1", DeviceResultStatus::Ok),
            ("r2", DeviceResultStatus::Error),
            ("r3", DeviceResultStatus::Skipped),
        ] {
            store
                .device_results()
                .upsert(&DeviceResult {
                    run_id: run.id,
                    device_name: name.into(),
                    device_id: None,
                    status,
                    result: serde_json::Value::Null,
                    error_message: None,
                    processed_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let counts = store.device_results().status_counts(run.id).await.unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                ok: 1,
                error: 1,
                skipped: 1
            }
        );
        assert_eq!(counts.terminal_status(), RunStatus::Partial);

        // Re-processing a device replaces its row instead of duplicating it.
        store
            .device_results()
            .upsert(&DeviceResult {
                run_id: run.id,
                device_name: "r2".into(),
                device_id: None,
                status: DeviceResultStatus::Ok,
                result: json!({"retried": true}),
                error_message: None,
                processed_at: Utc::now(),
            })
            .await
            .unwrap();
        let counts = store.device_results().status_counts(run.id).await.unwrap();
        assert_eq!(counts.ok, 2);
        assert_eq!(counts.error, 0);
        assert_eq!(counts.terminal_status(), RunStatus::Success);
    }

    #[tokio::test]
    async fn terminal_status_mapping() {
        assert_eq!(
            StatusCounts { ok: 0, error: 2, skipped: 1 }.terminal_status(),
            RunStatus::Failed
        );
        assert_eq!(
            StatusCounts { ok: 2, error: 0, skipped: 0 }.terminal_status(),
            RunStatus::Success
        );
        // All skipped counts as success: nothing failed.
        assert_eq!(
            StatusCounts { ok: 0, error: 0, skipped: 3 }.terminal_status(),
            RunStatus::Success
        );
    }

    #[tokio::test]
    async fn template_and_schedule_round_trip() {
        let store = seeded_store().await;
        let template = store
            .templates()
            .create(NewTemplate {
                name: "nightly".into(),
                job_type: JobType::Backup,
                inventory_source: InventorySource::Inventory,
                inventory_name: Some("core".into()),
                credential_id: None,
                is_global: false,
                no_overlap: true,
                config: json!({"backup_path": "{name}.cfg"}),
                created_by: "jdoe".into(),
            })
            .await
            .unwrap();
        assert!(template.no_overlap);

        // Visibility: owner sees it, others do not.
        assert_eq!(store.templates().list_visible("jdoe").await.unwrap().len(), 1);
        assert!(store.templates().list_visible("other").await.unwrap().is_empty());

        let schedule = store
            .schedules()
            .create(template.id, "0 0 2 * * *", true, None)
            .await
            .unwrap();
        assert_eq!(store.schedules().list_enabled().await.unwrap().len(), 1);
        store.schedules().set_enabled(schedule.id, false).await.unwrap();
        assert!(store.schedules().list_enabled().await.unwrap().is_empty());

        assert_eq!(
            store
                .runs()
                .active_count_for_template(template.id)
                .await
                .unwrap(),
            0
        );
    }
}
