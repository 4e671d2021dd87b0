use crate::error::StoreError;
use chrono::{DateTime, Utc};
use cockpit_model::{ComparisonOutcome, Nb2CmkJob, Nb2CmkJobResult, Nb2CmkJobStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

pub struct Nb2CmkRepo<'a> {
    pool: &'a SqlitePool,
}

impl<'a> Nb2CmkRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_job(
        &self,
        job_id: Uuid,
        started_by: &str,
        total: u32,
    ) -> Result<Nb2CmkJob, StoreError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO nb2cmk_jobs (job_id, status, started_by, progress_current, \
             progress_total, created_at) VALUES (?1, 'pending', ?2, 0, ?3, ?4)",
        )
        .bind(job_id.to_string())
        .bind(started_by)
        .bind(total)
        .bind(now)
        .execute(self.pool)
        .await?;
        self.get(job_id).await?.ok_or(StoreError::NotFound("nb2cmk job"))
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Option<Nb2CmkJob>, StoreError> {
        let row = sqlx::query("SELECT * FROM nb2cmk_jobs WHERE job_id = ?1")
            .bind(job_id.to_string())
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    pub async fn set_status(
        &self,
        job_id: Uuid,
        status: Nb2CmkJobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let completed_at = matches!(
            status,
            Nb2CmkJobStatus::Completed | Nb2CmkJobStatus::Failed
        )
        .then(Utc::now);
        sqlx::query(
            "UPDATE nb2cmk_jobs SET status = ?2, error = ?3, completed_at = ?4 WHERE job_id = ?1",
        )
        .bind(job_id.to_string())
        .bind(status.as_str())
        .bind(error)
        .bind(completed_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_total(&self, job_id: Uuid, total: u32) -> Result<(), StoreError> {
        sqlx::query("UPDATE nb2cmk_jobs SET progress_total = ?2 WHERE job_id = ?1")
            .bind(job_id.to_string())
            .bind(total)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_progress(&self, job_id: Uuid, current: u32) -> Result<(), StoreError> {
        sqlx::query("UPDATE nb2cmk_jobs SET progress_current = ?2 WHERE job_id = ?1")
            .bind(job_id.to_string())
            .bind(current)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// The single most recent pending or running job, if any.
    pub async fn active_job(&self) -> Result<Option<Nb2CmkJob>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM nb2cmk_jobs WHERE status IN ('pending', 'running') \
             ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(self.pool)
        .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    pub async fn recent_jobs(&self, limit: i64) -> Result<Vec<Nb2CmkJob>, StoreError> {
        let rows = sqlx::query("SELECT * FROM nb2cmk_jobs ORDER BY created_at DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    pub async fn add_result(&self, result: &Nb2CmkJobResult) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO nb2cmk_job_results (job_id, device_name, outcome, detail, processed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (job_id, device_name) DO UPDATE SET outcome = excluded.outcome, \
             detail = excluded.detail, processed_at = excluded.processed_at",
        )
        .bind(result.job_id.to_string())
        .bind(&result.device_name)
        .bind(result.outcome.as_str())
        .bind(result.detail.to_string())
        .bind(result.processed_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn results(&self, job_id: Uuid) -> Result<Vec<Nb2CmkJobResult>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM nb2cmk_job_results WHERE job_id = ?1 ORDER BY device_name",
        )
        .bind(job_id.to_string())
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(row_to_result).collect()
    }
}

fn row_to_job(row: &SqliteRow) -> Result<Nb2CmkJob, StoreError> {
    let job_id: String = row.try_get("job_id")?;
    let status: String = row.try_get("status")?;
    Ok(Nb2CmkJob {
        job_id: Uuid::parse_str(&job_id).map_err(StoreError::decode)?,
        status: Nb2CmkJobStatus::from_str(&status).map_err(StoreError::decode)?,
        started_by: row.try_get("started_by")?,
        progress_current: row.try_get::<i64, _>("progress_current")? as u32,
        progress_total: row.try_get::<i64, _>("progress_total")? as u32,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
        error: row.try_get("error")?,
    })
}

fn row_to_result(row: &SqliteRow) -> Result<Nb2CmkJobResult, StoreError> {
    let job_id: String = row.try_get("job_id")?;
    let outcome: String = row.try_get("outcome")?;
    let detail: String = row.try_get("detail")?;
    Ok(Nb2CmkJobResult {
        job_id: Uuid::parse_str(&job_id).map_err(StoreError::decode)?,
        device_name: row.try_get("device_name")?,
        outcome: ComparisonOutcome::from_str(&outcome).map_err(StoreError::decode)?,
        detail: serde_json::from_str(&detail).map_err(StoreError::decode)?,
        processed_at: row.try_get("processed_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use serde_json::json;

    #[tokio::test]
    async fn job_aggregates_per_device_outcomes() {
        let store = Store::connect_memory().await.unwrap();
        store.migrate().await.unwrap();

        let job_id = Uuid::new_v4();
        store.nb2cmk().create_job(job_id, "admin", 3).await.unwrap();
        assert!(store.nb2cmk().active_job().await.unwrap().is_some());

        store
            .nb2cmk()
            .set_status(job_id, Nb2CmkJobStatus::Running, None)
            .await
            .unwrap();

        for (device, outcome) in [
            ("LAB", ComparisonOutcome::Equal),
            ("CORE-1", ComparisonOutcome::Diff),
            ("EDGE-9", ComparisonOutcome::HostNotFound),
        ] {
            store
                .nb2cmk()
                .add_result(&Nb2CmkJobResult {
                    job_id,
                    device_name: device.into(),
                    outcome,
                    detail: json!({}),
                    processed_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        store
            .nb2cmk()
            .set_status(job_id, Nb2CmkJobStatus::Completed, None)
            .await
            .unwrap();
        assert!(store.nb2cmk().active_job().await.unwrap().is_none());

        let job = store.nb2cmk().get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, Nb2CmkJobStatus::Completed);
        assert!(job.completed_at.is_some());

        let results = store.nb2cmk().results(job_id).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results
            .iter()
            .any(|r| r.device_name == "LAB" && r.outcome == ComparisonOutcome::Equal));
    }
}
