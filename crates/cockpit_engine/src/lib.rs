pub mod agent_service;
pub mod conditions;
pub mod executors;
pub mod gitrepo;
pub mod reconcile;
pub mod registry;
pub mod scheduler;
pub mod templating;
pub mod worker;

pub use registry::JobDispatcher;
pub use scheduler::Scheduler;
pub use worker::Worker;

use cockpit_broker::{AgentBus, BrokerError, ResultBackend, TaskQueue};
use cockpit_checkmk::{CheckMkClient, CheckMkError};
use cockpit_device::{ConnectorFactory, DeviceError};
use cockpit_nautobot::{EntityCache, NautobotClient, NautobotError};
use cockpit_store::{Store, StoreError};
use cockpit_vault::{EncryptionService, VaultError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Nautobot(#[from] NautobotError),

    #[error(transparent)]
    CheckMk(#[from] CheckMkError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid job configuration: {0}")]
    Validation(String),

    #[error("agent '{0}' is offline or not responding")]
    AgentOffline(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("a run of template {0} is already active")]
    OverlapRefused(i64),
}

/// Explicitly constructed application context: every service the engine
/// talks to, built once at boot and shared by dispatcher, workers and the
/// scheduler. No process-wide globals.
pub struct EngineContext {
    pub store: Store,
    pub vault: EncryptionService,
    pub queue: TaskQueue,
    pub results: ResultBackend,
    pub agents: AgentBus,
    pub nautobot: NautobotClient,
    pub nautobot_cache: Option<EntityCache>,
    pub checkmk: CheckMkClient,
    pub connectors: Arc<dyn ConnectorFactory>,
}

pub type SharedContext = Arc<EngineContext>;
