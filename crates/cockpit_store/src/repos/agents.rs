use crate::error::StoreError;
use chrono::{DateTime, Utc};
use cockpit_model::{AgentCommand, AgentCommandStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

pub struct AgentCommandRepo<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AgentCommandRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn save(
        &self,
        agent_id: &str,
        command_id: Uuid,
        command: &str,
        params: &serde_json::Value,
        sent_by: &str,
    ) -> Result<AgentCommand, StoreError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO agent_commands (agent_id, command_id, command, params, status, sent_at, sent_by) \
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6)",
        )
        .bind(agent_id)
        .bind(command_id.to_string())
        .bind(command)
        .bind(params.to_string())
        .bind(now)
        .bind(sent_by)
        .execute(self.pool)
        .await?;

        Ok(AgentCommand {
            agent_id: agent_id.to_string(),
            command_id,
            command: command.to_string(),
            params: params.clone(),
            status: AgentCommandStatus::Pending,
            output: None,
            error: None,
            execution_time_ms: None,
            sent_at: now,
            completed_at: None,
            sent_by: sent_by.to_string(),
        })
    }

    /// Apply a response to the pending command row. Returns false when the
    /// row is already terminal — late or duplicate responses are dropped.
    pub async fn complete(
        &self,
        command_id: Uuid,
        status: AgentCommandStatus,
        output: Option<&str>,
        error: Option<&str>,
        execution_time_ms: Option<i64>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE agent_commands SET status = ?2, output = ?3, error = ?4, \
             execution_time_ms = ?5, completed_at = ?6 \
             WHERE command_id = ?1 AND status = 'pending'",
        )
        .bind(command_id.to_string())
        .bind(status.as_str())
        .bind(output)
        .bind(error)
        .bind(execution_time_ms)
        .bind(Utc::now())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, command_id: Uuid) -> Result<Option<AgentCommand>, StoreError> {
        let row = sqlx::query("SELECT * FROM agent_commands WHERE command_id = ?1")
            .bind(command_id.to_string())
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_command).transpose()
    }

    pub async fn history(
        &self,
        agent_id: &str,
        limit: i64,
    ) -> Result<Vec<AgentCommand>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM agent_commands WHERE agent_id = ?1 ORDER BY sent_at DESC LIMIT ?2",
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(row_to_command).collect()
    }

    pub async fn all_history(&self, limit: i64) -> Result<Vec<AgentCommand>, StoreError> {
        let rows = sqlx::query("SELECT * FROM agent_commands ORDER BY sent_at DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        rows.iter().map(row_to_command).collect()
    }
}

fn row_to_command(row: &SqliteRow) -> Result<AgentCommand, StoreError> {
    let command_id: String = row.try_get("command_id")?;
    let status: String = row.try_get("status")?;
    let params: String = row.try_get("params")?;
    Ok(AgentCommand {
        agent_id: row.try_get("agent_id")?,
        command_id: Uuid::parse_str(&command_id).map_err(StoreError::decode)?,
        command: row.try_get("command")?,
        params: serde_json::from_str(&params).map_err(StoreError::decode)?,
        status: AgentCommandStatus::from_str(&status).map_err(StoreError::decode)?,
        output: row.try_get("output")?,
        error: row.try_get("error")?,
        execution_time_ms: row.try_get("execution_time_ms")?,
        sent_at: row.try_get("sent_at")?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
        sent_by: row.try_get("sent_by")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use serde_json::json;

    #[tokio::test]
    async fn responses_apply_once_and_duplicates_are_dropped() {
        let store = Store::connect_memory().await.unwrap();
        store.migrate().await.unwrap();

        let command_id = Uuid::new_v4();
        store
            .agent_commands()
            .save("site-1", command_id, "git_pull", &json!({"branch": "main"}), "admin")
            .await
            .unwrap();

        let applied = store
            .agent_commands()
            .complete(command_id, AgentCommandStatus::Success, Some("Already up to date."), None, Some(120))
            .await
            .unwrap();
        assert!(applied);

        // A duplicate response to the same correlation id is discarded.
        let duplicate = store
            .agent_commands()
            .complete(command_id, AgentCommandStatus::Error, None, Some("boom"), None)
            .await
            .unwrap();
        assert!(!duplicate);

        let row = store.agent_commands().get(command_id).await.unwrap().unwrap();
        assert_eq!(row.status, AgentCommandStatus::Success);
        assert_eq!(row.output.as_deref(), Some("Already up to date."));
        assert!(row.completed_at.is_some());
    }

    #[tokio::test]
    async fn history_is_scoped_per_agent() {
        let store = Store::connect_memory().await.unwrap();
        store.migrate().await.unwrap();

        for agent in ["site-1", "site-1", "site-2"] {
            store
                .agent_commands()
                .save(agent, Uuid::new_v4(), "echo", &json!({}), "admin")
                .await
                .unwrap();
        }

        assert_eq!(
            store.agent_commands().history("site-1", 50).await.unwrap().len(),
            2
        );
        assert_eq!(store.agent_commands().all_history(50).await.unwrap().len(), 3);
    }
}
