mod agents;
mod lock;
mod queue;
mod results;

pub use agents::{AgentBus, HEARTBEAT_INTERVAL_SECS, ONLINE_MAX_AGE_SECS};
pub use lock::SchedulerLock;
pub use queue::{RouteTable, TaskEnvelope, TaskQueue};
pub use results::{ResultBackend, TaskResult, TaskState};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("payload failed to decode: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unknown queue '{0}'")]
    UnknownQueue(String),
}
