mod agent;
mod audit;
mod auth;
mod checkmk;
mod credentials;
mod inventory;
mod jobs;
mod settings;

pub use agent::{
    AgentCommand, AgentCommandStatus, AgentInfo, AgentRequest, AgentResponse, AgentStatus,
};
pub use audit::{AuditEvent, AuditSeverity};
pub use auth::{Permission, Role, User};
pub use checkmk::{
    ComparisonOutcome, Nb2CmkJob, Nb2CmkJobResult, Nb2CmkJobStatus, NormalizedHost, SnmpCommunity,
    SnmpSecurityLevel,
};
pub use credentials::{CredentialKind, CredentialRecord, CredentialStatus};
pub use inventory::{ConditionNode, ConditionOperator, GroupLogic, Inventory, InventoryScope};
pub use jobs::{
    DeviceResult, DeviceResultStatus, GitAuthType, GitRepository, InventorySource, JobRun,
    JobSchedule, JobTemplate, JobType, Progress, RunStatus,
};
pub use settings::{
    CacheSettings, CheckMkSettings, DeviceOffboardingSettings, GitSettings, NautobotDefaults,
    NautobotSettings, QueueDefinition, WorkerSettings,
};
