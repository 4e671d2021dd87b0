use crate::BrokerError;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

const QUEUE_PREFIX: &str = "cockpit:queue:";

/// JSON envelope pushed onto a queue list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: Uuid,
    pub task: String,
    pub kwargs: Value,
    pub queued_at: DateTime<Utc>,
}

/// Task-name to queue routing: exact names first, the `*` entry catches the
/// rest. Routes pointing at queues that do not exist fall back to `default`.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(String, String)>,
    known_queues: Vec<String>,
}

impl RouteTable {
    pub fn new(known_queues: Vec<String>) -> Self {
        Self {
            routes: Vec::new(),
            known_queues,
        }
    }

    /// Built-in routes mirroring the task families: backups, network scans
    /// and bulk work each get a dedicated queue when it is configured.
    pub fn with_builtin_routes(known_queues: Vec<String>) -> Self {
        let mut table = Self::new(known_queues);
        for (task, queue) in [
            ("run_device", "default"),
            ("finalize_run", "default"),
            ("backup_device", "backup"),
            ("finalize_backup", "backup"),
            ("scan_prefix", "network"),
            ("ping_address", "network"),
            ("sync_devices", "heavy"),
            ("*", "default"),
        ] {
            table.add_route(task, queue);
        }
        table
    }

    pub fn add_route(&mut self, task: &str, queue: &str) {
        self.routes.push((task.to_string(), queue.to_string()));
    }

    pub fn queue_for(&self, task: &str) -> &str {
        let routed = self
            .routes
            .iter()
            .find(|(pattern, _)| pattern == task)
            .or_else(|| self.routes.iter().find(|(pattern, _)| pattern == "*"))
            .map(|(_, queue)| queue.as_str())
            .unwrap_or("default");
        if self.known_queues.iter().any(|q| q == routed) {
            routed
        } else {
            "default"
        }
    }

    pub fn queues(&self) -> &[String] {
        &self.known_queues
    }
}

/// Redis-list backed task queue. One envelope per task, consumed with a
/// blocking pop so a worker holds at most one unacknowledged task.
pub struct TaskQueue {
    client: redis::Client,
    routes: RouteTable,
}

impl TaskQueue {
    pub fn new(broker_url: &str, routes: RouteTable) -> Result<Self, BrokerError> {
        let client = redis::Client::open(broker_url)?;
        Ok(Self { client, routes })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Publish a task by name; `queue` overrides the routing table.
    pub async fn publish(
        &self,
        task: &str,
        kwargs: Value,
        queue: Option<&str>,
    ) -> Result<Uuid, BrokerError> {
        let queue = match queue {
            Some(explicit) => {
                if !self.routes.queues().iter().any(|q| q == explicit) {
                    return Err(BrokerError::UnknownQueue(explicit.to_string()));
                }
                explicit
            }
            None => self.routes.queue_for(task),
        };

        let envelope = TaskEnvelope {
            task_id: Uuid::new_v4(),
            task: task.to_string(),
            kwargs,
            queued_at: Utc::now(),
        };
        let payload = serde_json::to_string(&envelope)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn
            .rpush(format!("{QUEUE_PREFIX}{queue}"), payload)
            .await?;
        debug!(task, queue, task_id = %envelope.task_id, "published task");
        Ok(envelope.task_id)
    }

    /// Blocking pop across the given queues. Returns None on timeout.
    pub async fn consume(
        &self,
        queues: &[String],
        timeout_secs: f64,
    ) -> Result<Option<TaskEnvelope>, BrokerError> {
        let keys: Vec<String> = queues
            .iter()
            .map(|q| format!("{QUEUE_PREFIX}{q}"))
            .collect();
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let popped: Option<(String, String)> = conn.blpop(keys, timeout_secs).await?;
        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Queue depth, for observability endpoints.
    pub async fn depth(&self, queue: &str) -> Result<u64, BrokerError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let n: u64 = conn.llen(format!("{QUEUE_PREFIX}{queue}")).await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queues(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn wildcard_routes_to_default() {
        let table = RouteTable::with_builtin_routes(queues(&["default", "backup"]));
        assert_eq!(table.queue_for("backup_device"), "backup");
        assert_eq!(table.queue_for("some_unrouted_task"), "default");
    }

    #[test]
    fn route_to_missing_queue_falls_back_to_default() {
        // "network" is not configured, so scan tasks land on default.
        let table = RouteTable::with_builtin_routes(queues(&["default", "backup"]));
        assert_eq!(table.queue_for("scan_prefix"), "default");

        let full = RouteTable::with_builtin_routes(queues(&["default", "backup", "network", "heavy"]));
        assert_eq!(full.queue_for("scan_prefix"), "network");
        assert_eq!(full.queue_for("sync_devices"), "heavy");
    }

    #[test]
    fn envelope_round_trips() {
        let envelope = TaskEnvelope {
            task_id: Uuid::new_v4(),
            task: "run_device".into(),
            kwargs: serde_json::json!({"run_id": "x", "device": {"name": "r1"}}),
            queued_at: Utc::now(),
        };
        let raw = serde_json::to_string(&envelope).unwrap();
        let back: TaskEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.task_id, envelope.task_id);
        assert_eq!(back.kwargs["device"]["name"], "r1");
    }
}
