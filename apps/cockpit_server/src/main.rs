use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cockpit_broker::{AgentBus, ResultBackend, RouteTable, SchedulerLock, TaskQueue};
use cockpit_checkmk::CheckMkClient;
use cockpit_device::SshConnectorFactory;
use cockpit_engine::{EngineContext, Scheduler, SharedContext, Worker};
use cockpit_nautobot::{EntityCache, NautobotClient};
use cockpit_server::config::AppConfig;
use cockpit_server::routes;
use cockpit_server::state::AppState;
use cockpit_store::Store;
use cockpit_vault::EncryptionService;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cockpit", about = "Network automation control plane")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Api,
    /// Consume task queues and execute jobs
    Worker {
        /// Queues to subscribe to; all configured queues when omitted
        #[arg(long)]
        queue: Vec<String>,
    },
    /// Evaluate job schedules under the exclusive scheduler lock
    Scheduler,
    /// Reconcile the database schema and exit
    Migrate,
    /// Re-encrypt stored credentials from the old key to the new one
    RotateKey {
        #[arg(long)]
        old_secret: String,
        #[arg(long)]
        new_secret: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Api => serve_api(config).await,
        Commands::Worker { queue } => run_worker(config, queue).await,
        Commands::Scheduler => run_scheduler(config).await,
        Commands::Migrate => run_migrate(config).await,
        Commands::RotateKey {
            old_secret,
            new_secret,
        } => rotate_key(config, &old_secret, &new_secret).await,
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();
}

async fn serve_api(config: AppConfig) -> Result<()> {
    let ctx = build_context(&config).await?;
    let state = AppState::new(ctx, config.clone());
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("bind {}", config.listen_addr))?;
    info!("api listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_worker(config: AppConfig, queues: Vec<String>) -> Result<()> {
    let ctx = build_context(&config).await?;
    let explicit = if queues.is_empty() { None } else { Some(queues) };
    let worker = Worker::from_settings(ctx, explicit).await?;
    worker.run().await?;
    Ok(())
}

async fn run_scheduler(config: AppConfig) -> Result<()> {
    let ctx = build_context(&config).await?;
    let lock = SchedulerLock::new(&config.result_url, 90_000)?;
    Scheduler::new(ctx, lock).run().await?;
    Ok(())
}

async fn run_migrate(config: AppConfig) -> Result<()> {
    let store = Store::connect(&config.database_url).await?;
    let report = store.migrate().await?;
    info!(
        tables = report.tables_created,
        columns = report.columns_added,
        versioned = report.migrations_applied,
        "migration finished"
    );
    Ok(())
}

async fn rotate_key(config: AppConfig, old_secret: &str, new_secret: &str) -> Result<()> {
    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;
    let old = EncryptionService::new(old_secret)?;
    let new = EncryptionService::new(new_secret)?;
    let report = store.credentials().rotate_all(&old, &new).await?;
    info!(rotated = report.rotated, "rotation committed");
    for (id, reason) in &report.failed {
        warn!(credential_id = id, "row not rotated: {reason}");
    }
    Ok(())
}

/// Build the shared application context: storage migrated, vault keyed,
/// broker wired, gateways constructed from stored settings.
async fn build_context(config: &AppConfig) -> Result<SharedContext> {
    let store = Store::connect(&config.database_url).await?;
    let report = store.migrate().await?;
    if report.total_changes() > 0 {
        info!(
            tables = report.tables_created,
            columns = report.columns_added,
            versioned = report.migrations_applied,
            "schema reconciled"
        );
    }

    let vault = EncryptionService::new(&config.secret_key)?;
    store
        .credentials()
        .bootstrap_initial(
            &vault,
            config.initial_username.as_deref(),
            config.initial_password.as_deref(),
        )
        .await?;
    bootstrap_admin_user(&store, config).await?;

    let worker_settings = store.settings().worker().await?;
    let queue_names: Vec<String> = worker_settings
        .queues
        .iter()
        .map(|queue| queue.name.clone())
        .collect();
    let queue = TaskQueue::new(
        &config.broker_url,
        RouteTable::with_builtin_routes(queue_names),
    )?;
    let results = ResultBackend::new(&config.result_url, worker_settings.result_ttl_secs)?;
    let agents = AgentBus::new(&config.result_url)?;

    let nautobot_settings = store.settings().nautobot().await?;
    if nautobot_settings.url.is_empty() {
        warn!("nautobot settings are empty; gateway calls will fail until configured");
    }
    let nautobot = NautobotClient::new(&nautobot_settings)?;

    let cache_settings = store.settings().cache().await?;
    let nautobot_cache =
        match EntityCache::new(&config.result_url, &cache_settings.prefix, cache_settings.ttl_secs)
        {
            Ok(cache) => Some(cache),
            Err(err) => {
                warn!("entity cache disabled: {err}");
                None
            }
        };

    let checkmk_settings = store.settings().checkmk().await?;
    let checkmk = CheckMkClient::new(&checkmk_settings)?;

    Ok(Arc::new(EngineContext {
        store,
        vault,
        queue,
        results,
        agents,
        nautobot,
        nautobot_cache,
        checkmk,
        connectors: Arc::new(SshConnectorFactory),
    }))
}

/// First boot with an empty user table: create the initial admin account
/// from the bootstrap environment and give it the admin role.
async fn bootstrap_admin_user(store: &Store, config: &AppConfig) -> Result<()> {
    if !store.users().list().await?.is_empty() {
        return Ok(());
    }
    let (Some(username), Some(password)) = (
        config.initial_username.as_deref(),
        config.initial_password.as_deref(),
    ) else {
        return Ok(());
    };

    let hash = cockpit_vault::hash_password(password)?;
    let user = store
        .users()
        .create(username, "Administrator", "", &hash)
        .await?;
    if let Some(admin) = store.rbac().role_by_name("admin").await? {
        store.rbac().assign_role(user.id, admin.id).await?;
    }
    info!(username, "created initial admin user");
    Ok(())
}
