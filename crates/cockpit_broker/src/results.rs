use crate::BrokerError;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const RESULT_PREFIX: &str = "cockpit:result:";
const RUN_PREFIX: &str = "cockpit:run:";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Started,
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub state: TaskState,
    pub payload: Value,
}

/// Redis-backed result store: task results with a TTL, atomic per-run
/// progress counters, and per-run cancel flags.
pub struct ResultBackend {
    client: redis::Client,
    ttl_secs: u64,
}

impl ResultBackend {
    pub fn new(result_url: &str, ttl_secs: u64) -> Result<Self, BrokerError> {
        let client = redis::Client::open(result_url)?;
        Ok(Self { client, ttl_secs })
    }

    pub async fn set_state(
        &self,
        task_id: Uuid,
        state: TaskState,
        payload: Value,
    ) -> Result<(), BrokerError> {
        let result = TaskResult { state, payload };
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn
            .set_ex(
                format!("{RESULT_PREFIX}{task_id}"),
                serde_json::to_string(&result)?,
                self.ttl_secs,
            )
            .await?;
        Ok(())
    }

    pub async fn fetch(&self, task_id: Uuid) -> Result<Option<TaskResult>, BrokerError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(format!("{RESULT_PREFIX}{task_id}")).await?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(BrokerError::from))
            .transpose()
    }

    /// Increment-and-fetch the processed counter of a run. The returned
    /// value is the progress after this device, used by the finishing task
    /// to detect the chord boundary.
    pub async fn incr_progress(&self, run_id: Uuid) -> Result<u64, BrokerError> {
        let key = format!("{RUN_PREFIX}{run_id}:processed");
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: u64 = conn.incr(&key, 1u64).await?;
        let _: () = conn.expire(&key, self.ttl_secs as i64).await?;
        Ok(value)
    }

    pub async fn request_cancel(&self, run_id: Uuid) -> Result<(), BrokerError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn
            .set_ex(format!("{RUN_PREFIX}{run_id}:cancelled"), 1, self.ttl_secs)
            .await?;
        Ok(())
    }

    /// Checked by workers between devices; in-flight I/O is never
    /// interrupted.
    pub async fn is_cancelled(&self, run_id: Uuid) -> Result<bool, BrokerError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let flag: Option<i64> = conn.get(format!("{RUN_PREFIX}{run_id}:cancelled")).await?;
        Ok(flag.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_result_round_trips() {
        let result = TaskResult {
            state: TaskState::Success,
            payload: serde_json::json!({"devices": 3}),
        };
        let raw = serde_json::to_string(&result).unwrap();
        assert!(raw.contains("\"success\""));
        let back: TaskResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.state, TaskState::Success);
        assert_eq!(back.payload["devices"], 3);
    }
}
