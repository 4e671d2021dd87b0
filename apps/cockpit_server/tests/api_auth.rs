use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use cockpit_broker::{AgentBus, ResultBackend, RouteTable, TaskQueue};
use cockpit_checkmk::CheckMkClient;
use cockpit_device::{FixedConnectorFactory, MockConnector};
use cockpit_engine::EngineContext;
use cockpit_model::{CheckMkSettings, NautobotSettings};
use cockpit_nautobot::NautobotClient;
use cockpit_server::config::AppConfig;
use cockpit_server::routes;
use cockpit_server::state::AppState;
use cockpit_store::Store;
use cockpit_vault::EncryptionService;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "api-test-secret";

async fn test_router() -> (Router, Store) {
    let store = Store::connect_memory().await.expect("memory store");
    store.migrate().await.expect("migrations");

    let unused = "redis://127.0.0.1:6390/0";
    let nautobot_settings = NautobotSettings {
        url: "http://127.0.0.1:1".into(),
        token: "t".into(),
        verify_ssl: true,
        timeout_secs: Some(1),
    };
    let ctx = Arc::new(EngineContext {
        store: store.clone(),
        vault: EncryptionService::new(SECRET).expect("vault"),
        queue: TaskQueue::new(unused, RouteTable::with_builtin_routes(vec!["default".into()]))
            .expect("queue"),
        results: ResultBackend::new(unused, 60).expect("results"),
        agents: AgentBus::new(unused).expect("agents"),
        nautobot: NautobotClient::new(&nautobot_settings).expect("nautobot"),
        nautobot_cache: None,
        checkmk: CheckMkClient::new(&CheckMkSettings {
            url: "http://127.0.0.1:1".into(),
            site: "main".into(),
            ..Default::default()
        })
        .expect("checkmk"),
        connectors: Arc::new(FixedConnectorFactory(Arc::new(MockConnector::new()))),
    });

    let config = AppConfig {
        secret_key: SECRET.into(),
        database_url: "sqlite::memory:".into(),
        broker_url: unused.into(),
        result_url: unused.into(),
        listen_addr: "127.0.0.1:0".into(),
        token_ttl_secs: 3600,
        rate_limit_per_minute: 0,
        initial_username: None,
        initial_password: None,
    };
    (routes::router(AppState::new(ctx, config)), store)
}

async fn seed_user(store: &Store, username: &str, password: &str, role: &str) {
    let hash = cockpit_vault::hash_password(password).expect("hash");
    let user = store
        .users()
        .create(username, "Test User", "", &hash)
        .await
        .expect("create user");
    let role = store
        .rbac()
        .role_by_name(role)
        .await
        .expect("role lookup")
        .expect("seeded role");
    store
        .rbac()
        .assign_role(user.id, role.id)
        .await
        .expect("assign role");
}

async fn login(router: &Router, username: &str, password: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"username": username, "password": password}).to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

#[tokio::test]
async fn login_returns_bearer_token_and_user() {
    let (router, store) = test_router().await;
    seed_user(&store, "admin", "hunter2", "admin").await;

    let (status, body) = login(&router, "admin", "hunter2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user"]["username"], "admin");
    assert!(body["access_token"].as_str().unwrap().contains('.'));

    // Last login is stamped and the event audited.
    let user = store.users().get_by_username("admin").await.unwrap().unwrap();
    assert!(user.last_login.is_some());
}

#[tokio::test]
async fn wrong_password_is_401_with_challenge() {
    let (router, store) = test_router().await;
    seed_user(&store, "admin", "hunter2", "admin").await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"username": "admin", "password": "wrong"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let (router, _store) = test_router().await;
    let response = router
        .clone()
        .oneshot(Request::builder().uri("/jobs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn viewer_reads_but_cannot_start_jobs() {
    let (router, store) = test_router().await;
    seed_user(&store, "guest", "view-only", "viewer").await;
    let (_, body) = login(&router, "guest", "view-only").await;
    let token = body["access_token"].as_str().unwrap().to_string();

    let read = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/jobs")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(read.status(), StatusCode::OK);

    let write = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/jobs/start")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"template_id": 1}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(write.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn api_key_exchanges_for_a_token() {
    let (router, store) = test_router().await;
    seed_user(&store, "automation", "unused-pass", "admin").await;
    let user = store
        .users()
        .get_by_username("automation")
        .await
        .unwrap()
        .unwrap();
    store
        .users()
        .set_api_key(user.id, Some("key-abc123"))
        .await
        .unwrap();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/api-key-login")
                .header("X-Api-Key", "key-abc123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bad = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/api-key-login")
                .header("X-Api-Key", "nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn audit_log_is_pageable_and_filterable() {
    let (router, store) = test_router().await;
    seed_user(&store, "admin", "hunter2", "admin").await;
    // Two successful logins and one failure in the trail.
    login(&router, "admin", "hunter2").await;
    login(&router, "admin", "hunter2").await;
    login(&router, "admin", "wrong").await;

    let (_, body) = login(&router, "admin", "hunter2").await;
    let token = body["access_token"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/logs?event_type=login_failed&severity=warning")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let page: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["event_type"], "login_failed");
}
