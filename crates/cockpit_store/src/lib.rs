mod error;
mod migrate;
mod repos;
mod schema;

pub use error::StoreError;
pub use migrate::{run_migrations, MigrationReport};
pub use repos::agents::AgentCommandRepo;
pub use repos::audit::{AuditFilter, AuditPage, AuditRepo};
pub use repos::credentials::{CredentialRepo, NewCredential, RotationReport};
pub use repos::git::GitRepositoryRepo;
pub use repos::inventories::InventoryRepo;
pub use repos::jobs::{
    DeviceResultRepo, JobRunRepo, JobScheduleRepo, JobTemplateRepo, NewRun, NewTemplate,
    StatusCounts,
};
pub use repos::nb2cmk::Nb2CmkRepo;
pub use repos::rbac::RbacRepo;
pub use repos::settings::SettingsRepo;
pub use repos::users::UserRepo;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Handle to the relational store. Cheap to clone; all repositories borrow
/// the shared pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // In-memory databases exist per connection; a larger pool would
        // hand out empty databases.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// In-memory store for tests.
    pub async fn connect_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    /// Reconcile the live schema against the declared model and apply
    /// versioned migrations. Idempotent.
    pub async fn migrate(&self) -> Result<MigrationReport, StoreError> {
        run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn users(&self) -> UserRepo<'_> {
        UserRepo::new(&self.pool)
    }

    pub fn rbac(&self) -> RbacRepo<'_> {
        RbacRepo::new(&self.pool)
    }

    pub fn credentials(&self) -> CredentialRepo<'_> {
        CredentialRepo::new(&self.pool)
    }

    pub fn git_repositories(&self) -> GitRepositoryRepo<'_> {
        GitRepositoryRepo::new(&self.pool)
    }

    pub fn templates(&self) -> JobTemplateRepo<'_> {
        JobTemplateRepo::new(&self.pool)
    }

    pub fn schedules(&self) -> JobScheduleRepo<'_> {
        JobScheduleRepo::new(&self.pool)
    }

    pub fn runs(&self) -> JobRunRepo<'_> {
        JobRunRepo::new(&self.pool)
    }

    pub fn device_results(&self) -> DeviceResultRepo<'_> {
        DeviceResultRepo::new(&self.pool)
    }

    pub fn inventories(&self) -> InventoryRepo<'_> {
        InventoryRepo::new(&self.pool)
    }

    pub fn settings(&self) -> SettingsRepo<'_> {
        SettingsRepo::new(&self.pool)
    }

    pub fn nb2cmk(&self) -> Nb2CmkRepo<'_> {
        Nb2CmkRepo::new(&self.pool)
    }

    pub fn audit(&self) -> AuditRepo<'_> {
        AuditRepo::new(&self.pool)
    }

    pub fn agent_commands(&self) -> AgentCommandRepo<'_> {
        AgentCommandRepo::new(&self.pool)
    }
}
