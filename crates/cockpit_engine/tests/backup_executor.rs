mod common;

use chrono::Utc;
use cockpit_device::MockConnector;
use cockpit_engine::executors;
use cockpit_model::{
    CredentialKind, DeviceResultStatus, GitAuthType, GitRepository, InventorySource, JobRun,
    JobTemplate, JobType, Progress, RunStatus,
};
use cockpit_store::NewCredential;
use cockpit_vault::EncryptionService;
use git2::Repository;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn device(name: &str, ip: &str, id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "primary_ip4": {"address": format!("{ip}/24")},
        "platform": {"name": "ios", "network_driver": "cisco_ios"},
        "location": {"name": "Berlin", "parent": {"name": "site"}},
        "_custom_field_data": {}
    })
}

fn backup_template(credential_id: i64) -> JobTemplate {
    JobTemplate {
        id: 1,
        name: "nightly backup".into(),
        job_type: JobType::Backup,
        inventory_source: InventorySource::All,
        inventory_name: None,
        credential_id: Some(credential_id),
        is_global: true,
        no_overlap: false,
        config: json!({
            "repository": "backups",
            "backup_path": "configs/{location.name}/{name}.cfg",
            "timestamp_custom_field": "last_backup",
        }),
        created_by: "admin".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn run_for(template: &JobTemplate, total: u32) -> JobRun {
    JobRun {
        id: Uuid::new_v4(),
        template_id: Some(template.id),
        job_type: template.job_type,
        status: RunStatus::Running,
        started_by: "admin".into(),
        started_at: Utc::now(),
        completed_at: None,
        progress: Progress {
            processed: 0,
            total,
        },
        result_summary: None,
        error: None,
        metadata: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn backup_writes_configs_and_commits_once() {
    let nautobot = MockServer::start().await;
    for id in ["dev-a", "dev-c"] {
        Mock::given(method("PATCH"))
            .and(path(format!("/api/dcim/devices/{id}/")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&nautobot)
            .await;
    }

    let connector = Arc::new(
        MockConnector::new()
            .respond("10.0.0.1", "show running-config", "hostname edge-a\n!\nend\n")
            .respond("10.0.0.3", "show running-config", "hostname edge-c\n!\nend\n")
            .refuse("10.0.0.2"),
    );
    let ctx = common::test_context(&nautobot.uri(), &nautobot.uri(), connector).await;

    let workdir = TempDir::new().unwrap();
    Repository::init(workdir.path()).unwrap();
    ctx.store
        .git_repositories()
        .create(&GitRepository {
            id: 0,
            name: "backups".into(),
            url: "file://local".into(),
            branch: "main".into(),
            category: "backup".into(),
            credential_name: None,
            auth_type: GitAuthType::None,
            verify_ssl: true,
            path: workdir.path().to_string_lossy().to_string(),
            active: true,
        })
        .await
        .unwrap();

    let vault = EncryptionService::new(common::TEST_SECRET).unwrap();
    let credential = ctx
        .store
        .credentials()
        .create(
            &vault,
            NewCredential {
                name: "device-ssh".into(),
                source: "general".into(),
                username: "svc".into(),
                kind: CredentialKind::Ssh,
                password: Some("ssh-password".into()),
                ssh_key: None,
                passphrase: None,
                valid_until: None,
            },
        )
        .await
        .unwrap();
    let template = backup_template(credential.id);

    // Devices A and C back up; B refuses SSH and surfaces as an error,
    // without aborting anything else.
    let outcome_a = executors::execute_device(&ctx, &template, &device("edge-a", "10.0.0.1", "dev-a"))
        .await
        .unwrap();
    assert_eq!(outcome_a.status, DeviceResultStatus::Ok);
    assert_eq!(outcome_a.result["files"][0], "configs/Berlin/edge-a.cfg");

    let failure_b =
        executors::execute_device(&ctx, &template, &device("edge-b", "10.0.0.2", "dev-b")).await;
    assert!(failure_b.is_err());

    let outcome_c = executors::execute_device(&ctx, &template, &device("edge-c", "10.0.0.3", "dev-c"))
        .await
        .unwrap();
    assert_eq!(outcome_c.status, DeviceResultStatus::Ok);

    // One commit for the whole run, holding both successful configs.
    let run = run_for(&template, 3);
    let summary = executors::finalize_job(&ctx, &run, &template).await.unwrap();
    assert_eq!(summary["committed"], true);

    let repo = Repository::open(workdir.path()).unwrap();
    let tree = repo.head().unwrap().peel_to_commit().unwrap().tree().unwrap();
    assert!(tree.get_path(std::path::Path::new("configs/Berlin/edge-a.cfg")).is_ok());
    assert!(tree.get_path(std::path::Path::new("configs/Berlin/edge-c.cfg")).is_ok());
    assert!(tree.get_path(std::path::Path::new("configs/Berlin/edge-b.cfg")).is_err());

    // A second finalize with no new device work commits nothing.
    let summary = executors::finalize_job(&ctx, &run, &template).await.unwrap();
    assert_eq!(summary["committed"], false);
}

#[tokio::test]
async fn device_without_primary_ip_is_skipped() {
    let nautobot = MockServer::start().await;
    let ctx = common::test_context(
        &nautobot.uri(),
        &nautobot.uri(),
        Arc::new(MockConnector::new()),
    )
    .await;

    let workdir = TempDir::new().unwrap();
    Repository::init(workdir.path()).unwrap();
    ctx.store
        .git_repositories()
        .create(&GitRepository {
            id: 0,
            name: "backups".into(),
            url: "file://local".into(),
            branch: "main".into(),
            category: "backup".into(),
            credential_name: None,
            auth_type: GitAuthType::None,
            verify_ssl: true,
            path: workdir.path().to_string_lossy().to_string(),
            active: true,
        })
        .await
        .unwrap();

    let vault = EncryptionService::new(common::TEST_SECRET).unwrap();
    let credential = ctx
        .store
        .credentials()
        .create(
            &vault,
            NewCredential {
                name: "device-ssh".into(),
                source: "general".into(),
                username: "svc".into(),
                kind: CredentialKind::Ssh,
                password: Some("ssh-password".into()),
                ssh_key: None,
                passphrase: None,
                valid_until: None,
            },
        )
        .await
        .unwrap();
    let template = backup_template(credential.id);

    let no_ip = json!({"id": "dev-x", "name": "mgmt-x", "platform": {"name": "ios"}});
    let outcome = executors::execute_device(&ctx, &template, &no_ip).await.unwrap();
    assert_eq!(outcome.status, DeviceResultStatus::Skipped);
}
