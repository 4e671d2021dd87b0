use crate::BrokerError;
use chrono::Utc;
use cockpit_model::{AgentInfo, AgentRequest, AgentResponse, AgentStatus};
use futures::StreamExt;
use redis::AsyncCommands;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const ONLINE_MAX_AGE_SECS: i64 = 90;

const COMMAND_CHANNEL_PREFIX: &str = "cockpit-agent:";
const RESPONSE_CHANNEL_PREFIX: &str = "cockpit-agent-response:";
const REGISTRY_PREFIX: &str = "agents:";

/// Pub/sub command dispatch to site agents plus the heartbeat registry.
/// Correlation is by command UUID only; ordering across commands is not
/// guaranteed.
pub struct AgentBus {
    client: redis::Client,
}

impl AgentBus {
    pub fn new(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }

    /// Publish a command for an agent. The caller persists the command row
    /// before this is invoked.
    pub async fn send(
        &self,
        agent_id: &str,
        command_id: Uuid,
        command: &str,
        params: Value,
    ) -> Result<AgentRequest, BrokerError> {
        let request = AgentRequest {
            command_id,
            command: command.to_string(),
            params,
            timestamp: Utc::now().timestamp(),
            sender: "cockpit-backend".into(),
        };
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn
            .publish(
                format!("{COMMAND_CHANNEL_PREFIX}{agent_id}"),
                serde_json::to_string(&request)?,
            )
            .await?;
        debug!(agent_id, command, command_id = %command_id, "agent command published");
        Ok(request)
    }

    /// Block on the response channel until the matching command_id arrives
    /// or the timeout passes. Responses for other ids are ignored.
    pub async fn wait_for_response(
        &self,
        agent_id: &str,
        command_id: Uuid,
        timeout: Duration,
    ) -> Result<Option<AgentResponse>, BrokerError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub
            .subscribe(format!("{RESPONSE_CHANNEL_PREFIX}{agent_id}"))
            .await?;

        let wait = async {
            let mut stream = pubsub.on_message();
            while let Some(message) = stream.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!("undecodable agent response payload: {err}");
                        continue;
                    }
                };
                match serde_json::from_str::<AgentResponse>(&payload) {
                    Ok(response) if response.command_id == command_id => return Some(response),
                    Ok(_) => continue,
                    Err(err) => {
                        warn!("agent response is not valid JSON: {err}");
                        continue;
                    }
                }
            }
            None
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(response) => Ok(response),
            Err(_) => Ok(None),
        }
    }

    /// Used by the site agent to answer a command.
    pub async fn publish_response(
        &self,
        agent_id: &str,
        response: &AgentResponse,
    ) -> Result<(), BrokerError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn
            .publish(
                format!("{RESPONSE_CHANNEL_PREFIX}{agent_id}"),
                serde_json::to_string(response)?,
            )
            .await?;
        Ok(())
    }

    /// Command subscription for the site agent side.
    pub async fn command_stream(&self, agent_id: &str) -> Result<redis::aio::PubSub, BrokerError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub
            .subscribe(format!("{COMMAND_CHANNEL_PREFIX}{agent_id}"))
            .await?;
        Ok(pubsub)
    }

    /// Heartbeat write: the agent's registry hash, TTL three heartbeats so
    /// dead agents age out.
    pub async fn write_heartbeat(
        &self,
        agent_id: &str,
        version: &str,
        capabilities: &[&str],
        started_at: i64,
        commands_executed: u64,
    ) -> Result<(), BrokerError> {
        let key = format!("{REGISTRY_PREFIX}{agent_id}");
        let fields: Vec<(&str, String)> = vec![
            ("status", "online".into()),
            ("last_heartbeat", Utc::now().timestamp().to_string()),
            ("version", version.to_string()),
            ("capabilities", capabilities.join(",")),
            ("started_at", started_at.to_string()),
            ("commands_executed", commands_executed.to_string()),
        ];
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.hset_multiple(&key, &fields).await?;
        let _: () = conn
            .expire(&key, (HEARTBEAT_INTERVAL_SECS * 3) as i64)
            .await?;
        Ok(())
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentInfo>, BrokerError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let fields: HashMap<String, String> =
            conn.hgetall(format!("{REGISTRY_PREFIX}{agent_id}")).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(parse_agent_info(agent_id, &fields, Utc::now().timestamp())))
    }

    /// Scan the registry; agents whose heartbeat is stale are reported
    /// offline.
    pub async fn list_agents(&self) -> Result<Vec<AgentInfo>, BrokerError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let keys: Vec<String> = conn.keys(format!("{REGISTRY_PREFIX}*")).await?;
        let now = Utc::now().timestamp();
        let mut agents = Vec::with_capacity(keys.len());
        for key in keys {
            let agent_id = key.trim_start_matches(REGISTRY_PREFIX).to_string();
            let fields: HashMap<String, String> = conn.hgetall(&key).await?;
            if fields.is_empty() {
                continue;
            }
            agents.push(parse_agent_info(&agent_id, &fields, now));
        }
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    pub async fn is_online(&self, agent_id: &str) -> Result<bool, BrokerError> {
        Ok(self
            .get_agent(agent_id)
            .await?
            .map(|info| info.status == AgentStatus::Online)
            .unwrap_or(false))
    }
}

fn parse_agent_info(agent_id: &str, fields: &HashMap<String, String>, now: i64) -> AgentInfo {
    let last_heartbeat = fields
        .get("last_heartbeat")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let reported_online = fields.get("status").map(|s| s == "online").unwrap_or(false);
    let status = if reported_online && now - last_heartbeat < ONLINE_MAX_AGE_SECS {
        AgentStatus::Online
    } else {
        AgentStatus::Offline
    };
    AgentInfo {
        agent_id: agent_id.to_string(),
        status,
        last_heartbeat,
        version: fields.get("version").cloned(),
        capabilities: fields
            .get("capabilities")
            .map(|raw| {
                raw.split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        started_at: fields
            .get("started_at")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        commands_executed: fields
            .get("commands_executed")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
    }
}
