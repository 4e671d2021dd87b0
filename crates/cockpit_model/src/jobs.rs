use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Backup,
    RunCommands,
    SyncDevices,
    CompareDevices,
    ScanPrefixes,
    IpAddresses,
    DeployAgent,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Backup => "backup",
            JobType::RunCommands => "run_commands",
            JobType::SyncDevices => "sync_devices",
            JobType::CompareDevices => "compare_devices",
            JobType::ScanPrefixes => "scan_prefixes",
            JobType::IpAddresses => "ip_addresses",
            JobType::DeployAgent => "deploy_agent",
        }
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "backup" => Ok(JobType::Backup),
            "run_commands" => Ok(JobType::RunCommands),
            "sync_devices" => Ok(JobType::SyncDevices),
            "compare_devices" => Ok(JobType::CompareDevices),
            "scan_prefixes" => Ok(JobType::ScanPrefixes),
            "ip_addresses" => Ok(JobType::IpAddresses),
            "deploy_agent" => Ok(JobType::DeployAgent),
            other => Err(format!("unknown job type '{}'", other)),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InventorySource {
    #[default]
    All,
    Inventory,
}

/// Reusable definition of a job: its type plus per-type configuration.
/// Per-type fields live in `config` so the template table stays stable as
/// job types grow options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTemplate {
    pub id: i64,
    pub name: String,
    pub job_type: JobType,
    #[serde(default)]
    pub inventory_source: InventorySource,
    #[serde(default)]
    pub inventory_name: Option<String>,
    #[serde(default)]
    pub credential_id: Option<i64>,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub no_overlap: bool,
    #[serde(default)]
    pub config: serde_json::Value,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobTemplate {
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    pub fn config_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(|v| v.as_bool())
    }

    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(|v| v.as_u64())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSchedule {
    pub id: i64,
    pub template_id: i64,
    pub cron: String,
    pub enabled: bool,
    #[serde(default)]
    pub credential_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Partial,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::Partial | RunStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Partial => "partial",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            "partial" => Ok(RunStatus::Partial),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Progress {
    pub processed: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: Uuid,
    pub template_id: Option<i64>,
    pub job_type: JobType,
    pub status: RunStatus,
    pub started_by: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub result_summary: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceResultStatus {
    Ok,
    Error,
    Skipped,
}

impl DeviceResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceResultStatus::Ok => "ok",
            DeviceResultStatus::Error => "error",
            DeviceResultStatus::Skipped => "skipped",
        }
    }
}

impl FromStr for DeviceResultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(DeviceResultStatus::Ok),
            "error" => Ok(DeviceResultStatus::Error),
            "skipped" => Ok(DeviceResultStatus::Skipped),
            other => Err(format!("unknown device result status '{}'", other)),
        }
    }
}

/// One device's outcome inside a Run. One row per (run, device).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceResult {
    pub run_id: Uuid,
    pub device_name: String,
    #[serde(default)]
    pub device_id: Option<String>,
    pub status: DeviceResultStatus,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default)]
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GitAuthType {
    Token,
    SshKey,
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitRepository {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub branch: String,
    pub category: String,
    #[serde(default)]
    pub credential_name: Option<String>,
    #[serde(default)]
    pub auth_type: GitAuthType,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    pub path: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_round_trips_through_str() {
        for jt in [
            JobType::Backup,
            JobType::RunCommands,
            JobType::SyncDevices,
            JobType::CompareDevices,
            JobType::ScanPrefixes,
            JobType::IpAddresses,
            JobType::DeployAgent,
        ] {
            assert_eq!(jt.as_str().parse::<JobType>().unwrap(), jt);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Partial.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn template_config_accessors() {
        let template = JobTemplate {
            id: 1,
            name: "nightly backup".into(),
            job_type: JobType::Backup,
            inventory_source: InventorySource::All,
            inventory_name: None,
            credential_id: Some(4),
            is_global: true,
            no_overlap: false,
            config: serde_json::json!({
                "backup_path": "configs/{location.name}/{name}.cfg",
                "fetch_startup": true,
            }),
            created_by: "admin".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(
            template.config_str("backup_path"),
            Some("configs/{location.name}/{name}.cfg")
        );
        assert_eq!(template.config_bool("fetch_startup"), Some(true));
        assert_eq!(template.config_u64("missing"), None);
    }
}
