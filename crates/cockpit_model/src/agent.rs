use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentCommandStatus {
    Pending,
    Success,
    Error,
    Timeout,
}

impl AgentCommandStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgentCommandStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentCommandStatus::Pending => "pending",
            AgentCommandStatus::Success => "success",
            AgentCommandStatus::Error => "error",
            AgentCommandStatus::Timeout => "timeout",
        }
    }
}

impl FromStr for AgentCommandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AgentCommandStatus::Pending),
            "success" => Ok(AgentCommandStatus::Success),
            "error" => Ok(AgentCommandStatus::Error),
            "timeout" => Ok(AgentCommandStatus::Timeout),
            other => Err(format!("unknown agent command status '{}'", other)),
        }
    }
}

/// Persisted record of a command sent to a site agent.
/// Transitions pending -> terminal only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommand {
    pub agent_id: String,
    pub command_id: Uuid,
    pub command: String,
    pub params: serde_json::Value,
    pub status: AgentCommandStatus,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: Option<i64>,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub sent_by: String,
}

/// Wire format published on `cockpit-agent:<agent_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub command_id: Uuid,
    pub command: String,
    pub params: serde_json::Value,
    pub timestamp: i64,
    pub sender: String,
}

/// Wire format published on `cockpit-agent-response:<agent_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub command_id: Uuid,
    pub status: AgentCommandStatus,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
}

/// Registry view of an agent, read from its heartbeat hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub status: AgentStatus,
    pub last_heartbeat: i64,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub started_at: i64,
    pub commands_executed: u64,
}
