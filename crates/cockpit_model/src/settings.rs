use serde::{Deserialize, Serialize};

/// Nautobot connection settings singleton.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NautobotSettings {
    pub url: String,
    pub token: String,
    pub verify_ssl: bool,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CheckMkSettings {
    pub url: String,
    pub site: String,
    pub username: String,
    pub password: String,
    pub verify_ssl: bool,
    /// Folder template rendered per device, e.g. "/site/{location.name}".
    pub folder_template: String,
    /// Attribute keys excluded from comparison on top of meta_data.
    pub ignore_attributes: Vec<String>,
    /// SNMP mapping file keyed by a Nautobot custom-field id.
    pub snmp_mapping_path: Option<String>,
    pub snmp_custom_field: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GitSettings {
    pub author_name: String,
    pub author_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub prefix: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 1800,
            prefix: "nautobot".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Worker/broker settings singleton (the celery-equivalent knobs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub queues: Vec<QueueDefinition>,
    pub task_time_limit_secs: u64,
    pub result_ttl_secs: u64,
    pub max_tasks_per_child: u32,
    pub prefetch: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            queues: vec![QueueDefinition {
                name: "default".into(),
                description: "Default queue".into(),
            }],
            task_time_limit_secs: 3600,
            result_ttl_secs: 86_400,
            max_tasks_per_child: 100,
            prefetch: 1,
        }
    }
}

/// Default entity names applied when onboarding writes back to Nautobot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NautobotDefaults {
    pub device_role: Option<String>,
    pub device_status: Option<String>,
    pub ip_status: Option<String>,
    pub namespace: Option<String>,
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DeviceOffboardingSettings {
    /// "remove" deletes the device; "set-offboarding" tags it instead.
    pub integration_mode: Option<String>,
    pub offboarding_status: Option<String>,
    pub remove_primary_ip: bool,
    pub remove_interface_ips: bool,
    pub remove_from_checkmk: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_defaults_match_broker_contract() {
        let settings = WorkerSettings::default();
        assert_eq!(settings.prefetch, 1);
        assert_eq!(settings.max_tasks_per_child, 100);
        assert_eq!(settings.task_time_limit_secs, 3600);
        assert_eq!(settings.result_ttl_secs, 86_400);
        assert_eq!(settings.queues.len(), 1);
        assert_eq!(settings.queues[0].name, "default");
    }

    #[test]
    fn checkmk_settings_tolerate_sparse_json() {
        let parsed: CheckMkSettings =
            serde_json::from_str(r#"{"url": "https://cmk.example.net", "site": "main"}"#).unwrap();
        assert_eq!(parsed.site, "main");
        assert!(parsed.ignore_attributes.is_empty());
    }
}
