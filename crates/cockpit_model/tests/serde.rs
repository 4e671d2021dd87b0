use chrono::Utc;
use cockpit_model::*;
use serde_json::json;
use uuid::Uuid;

#[test]
fn job_run_round_trip() {
    let run = JobRun {
        id: Uuid::nil(),
        template_id: Some(3),
        job_type: JobType::Backup,
        status: RunStatus::Partial,
        started_by: "scheduler".into(),
        started_at: Utc::now(),
        completed_at: Some(Utc::now()),
        progress: Progress {
            processed: 3,
            total: 3,
        },
        result_summary: Some(json!({"ok": 2, "error": 1})),
        error: None,
        metadata: json!({"queue": "backup"}),
    };

    let serialized = serde_json::to_string_pretty(&run).expect("serialize run");
    let restored: JobRun = serde_json::from_str(&serialized).expect("deserialize run");
    assert_eq!(restored.status, RunStatus::Partial);
    assert_eq!(restored.progress.processed, 3);
    assert_eq!(restored.job_type, JobType::Backup);
}

#[test]
fn template_parses_from_yaml() {
    let yaml = r#"
id: 12
name: weekly scan
job_type: scan_prefixes
inventory_source: inventory
inventory_name: berlin-prefixes
is_global: true
config:
  ping_count: 2
  set_reachable_active: true
created_by: admin
created_at: 2025-05-01T08:00:00Z
updated_at: 2025-05-01T08:00:00Z
"#;
    let template: JobTemplate = serde_yaml::from_str(yaml).expect("deserialize template");
    assert_eq!(template.job_type, JobType::ScanPrefixes);
    assert_eq!(template.inventory_source, InventorySource::Inventory);
    assert_eq!(template.config_u64("ping_count"), Some(2));
    assert_eq!(template.config_bool("set_reachable_active"), Some(true));
    assert!(!template.no_overlap);
}

#[test]
fn agent_response_round_trip() {
    let response = AgentResponse {
        command_id: Uuid::new_v4(),
        status: AgentCommandStatus::Error,
        output: None,
        error: Some("container not allowed".into()),
        execution_time_ms: Some(12),
    };
    let encoded = serde_json::to_string(&response).expect("serialize response");
    let decoded: AgentResponse = serde_json::from_str(&encoded).expect("deserialize response");
    assert_eq!(decoded.command_id, response.command_id);
    assert_eq!(decoded.status, AgentCommandStatus::Error);
}

#[test]
fn normalized_host_equality_covers_attributes() {
    let mut a = NormalizedHost {
        hostname: "LAB".into(),
        folder: "/network/Berlin".into(),
        attributes: serde_json::Map::new(),
    };
    a.attributes
        .insert("ipaddress".into(), json!("192.0.2.10"));
    let mut b = a.clone();
    assert_eq!(a, b);
    b.attributes.insert("alias".into(), json!("Lab switch"));
    assert_ne!(a, b);
}
