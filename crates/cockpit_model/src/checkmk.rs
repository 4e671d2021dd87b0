use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SnmpSecurityLevel {
    #[serde(rename = "noAuthNoPriv")]
    NoAuthNoPriv,
    #[serde(rename = "authNoPriv")]
    AuthNoPriv,
    #[serde(rename = "authPriv")]
    AuthPriv,
}

/// SNMP credential attached to a CheckMK host. Compared as a whole value,
/// discriminant first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SnmpCommunity {
    #[serde(rename = "v1_v2_community")]
    Community { community: String },
    #[serde(rename = "v3")]
    V3 {
        security_level: SnmpSecurityLevel,
        auth_protocol: String,
        auth_password: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        priv_protocol: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        priv_password: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        security_name: Option<String>,
    },
}

/// Desired CheckMK host state derived from a Nautobot device.
/// The open attribute set is a JSON map so comparison can exclude ignored
/// keys without enumerating every CheckMK attribute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedHost {
    pub hostname: String,
    pub folder: String,
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOutcome {
    Equal,
    Diff,
    HostNotFound,
    Error,
}

impl ComparisonOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOutcome::Equal => "equal",
            ComparisonOutcome::Diff => "diff",
            ComparisonOutcome::HostNotFound => "host_not_found",
            ComparisonOutcome::Error => "error",
        }
    }
}

impl FromStr for ComparisonOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equal" => Ok(ComparisonOutcome::Equal),
            "diff" => Ok(ComparisonOutcome::Diff),
            "host_not_found" => Ok(ComparisonOutcome::HostNotFound),
            "error" => Ok(ComparisonOutcome::Error),
            other => Err(format!("unknown comparison outcome '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Nb2CmkJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Nb2CmkJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Nb2CmkJobStatus::Pending => "pending",
            Nb2CmkJobStatus::Running => "running",
            Nb2CmkJobStatus::Completed => "completed",
            Nb2CmkJobStatus::Failed => "failed",
        }
    }
}

impl FromStr for Nb2CmkJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Nb2CmkJobStatus::Pending),
            "running" => Ok(Nb2CmkJobStatus::Running),
            "completed" => Ok(Nb2CmkJobStatus::Completed),
            "failed" => Ok(Nb2CmkJobStatus::Failed),
            other => Err(format!("unknown nb2cmk job status '{}'", other)),
        }
    }
}

/// Long-running Nautobot-to-CheckMK reconciliation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nb2CmkJob {
    pub job_id: Uuid,
    pub status: Nb2CmkJobStatus,
    pub started_by: String,
    pub progress_current: u32,
    pub progress_total: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nb2CmkJobResult {
    pub job_id: Uuid,
    pub device_name: String,
    pub outcome: ComparisonOutcome,
    #[serde(default)]
    pub detail: serde_json::Value,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snmp_union_serialises_with_discriminant() {
        let v2 = SnmpCommunity::Community {
            community: "public".into(),
        };
        let encoded = serde_json::to_value(&v2).unwrap();
        assert_eq!(encoded["type"], "v1_v2_community");
        assert_eq!(encoded["community"], "public");

        let v3 = SnmpCommunity::V3 {
            security_level: SnmpSecurityLevel::AuthPriv,
            auth_protocol: "SHA-256".into(),
            auth_password: "secret".into(),
            priv_protocol: Some("AES-128".into()),
            priv_password: Some("secret2".into()),
            security_name: None,
        };
        let encoded = serde_json::to_value(&v3).unwrap();
        assert_eq!(encoded["type"], "v3");
        assert_eq!(encoded["security_level"], "authPriv");
        assert!(encoded.get("security_name").is_none());
    }

    #[test]
    fn snmp_comparison_is_structural() {
        let a = SnmpCommunity::Community {
            community: "public".into(),
        };
        let b = SnmpCommunity::Community {
            community: "public".into(),
        };
        let c = SnmpCommunity::Community {
            community: "private".into(),
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
