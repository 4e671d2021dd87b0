use cockpit_broker::{AgentBus, ResultBackend, RouteTable, TaskQueue};
use cockpit_checkmk::CheckMkClient;
use cockpit_device::{DynConnector, FixedConnectorFactory};
use cockpit_engine::{EngineContext, SharedContext};
use cockpit_model::{CheckMkSettings, NautobotSettings};
use cockpit_nautobot::NautobotClient;
use cockpit_store::Store;
use cockpit_vault::EncryptionService;
use std::sync::Arc;

pub const TEST_SECRET: &str = "engine-test-secret";

/// Context against in-memory storage and mock upstreams. The broker
/// clients parse their URLs lazily, so no Redis is needed as long as the
/// code under test stays off the queue paths.
pub async fn test_context(
    nautobot_url: &str,
    checkmk_url: &str,
    connector: DynConnector,
) -> SharedContext {
    let store = Store::connect_memory().await.expect("memory store");
    store.migrate().await.expect("migrations");

    let nautobot_settings = NautobotSettings {
        url: nautobot_url.to_string(),
        token: "test-token".into(),
        verify_ssl: true,
        timeout_secs: Some(5),
    };
    store
        .settings()
        .save("nautobot", &nautobot_settings)
        .await
        .expect("save nautobot settings");

    let checkmk_settings = CheckMkSettings {
        url: checkmk_url.to_string(),
        site: "main".into(),
        username: "automation".into(),
        password: "secret".into(),
        verify_ssl: true,
        folder_template: "/{location.parent.name}/{location.name}".into(),
        ..Default::default()
    };
    store
        .settings()
        .save("checkmk", &checkmk_settings)
        .await
        .expect("save checkmk settings");

    let unused_redis = "redis://127.0.0.1:6390/0";
    Arc::new(EngineContext {
        store,
        vault: EncryptionService::new(TEST_SECRET).expect("vault"),
        queue: TaskQueue::new(
            unused_redis,
            RouteTable::with_builtin_routes(vec!["default".into()]),
        )
        .expect("queue"),
        results: ResultBackend::new(unused_redis, 60).expect("results"),
        agents: AgentBus::new(unused_redis).expect("agent bus"),
        nautobot: NautobotClient::new(&nautobot_settings).expect("nautobot client"),
        nautobot_cache: None,
        checkmk: CheckMkClient::new(&checkmk_settings).expect("checkmk client"),
        connectors: Arc::new(FixedConnectorFactory(connector)),
    })
}
