//! Boot-time migration runner: automatic schema synchronisation against the
//! declared model, then ordered versioned migrations tracked in
//! `schema_migrations`.

use crate::error::StoreError;
use crate::schema::{add_column_def, TABLES};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::info;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub tables_created: u32,
    pub columns_added: u32,
    pub migrations_applied: u32,
}

impl MigrationReport {
    pub fn total_changes(&self) -> u32 {
        self.tables_created + self.columns_added + self.migrations_applied
    }
}

struct Migration {
    name: &'static str,
    description: &'static str,
    statements: &'static [&'static str],
}

impl Migration {
    fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for statement in self.statements {
            hasher.update(statement.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

/// Ordered, explicitly versioned migrations. Seed data and anything
/// potentially destructive lives here, never in the auto-sync.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_seed_rbac",
        description: "base roles and permissions; admin grants everything, viewer reads",
        statements: &[
            "INSERT OR IGNORE INTO roles (name, description) VALUES ('admin', 'Full access')",
            "INSERT OR IGNORE INTO roles (name, description) VALUES ('viewer', 'Read-only access')",
            "INSERT OR IGNORE INTO permissions (resource, action) VALUES \
             ('jobs', 'read'), ('jobs', 'write'), \
             ('credentials', 'read'), ('credentials', 'write'), \
             ('inventories', 'read'), ('inventories', 'write'), \
             ('devices', 'read'), ('devices', 'write'), \
             ('agents', 'read'), ('agents', 'write'), \
             ('settings', 'read'), ('settings', 'write'), \
             ('users', 'read'), ('users', 'write'), \
             ('logs', 'read')",
            "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) \
             SELECT r.id, p.id FROM roles r, permissions p WHERE r.name = 'admin'",
            "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) \
             SELECT r.id, p.id FROM roles r, permissions p \
             WHERE r.name = 'viewer' AND p.action = 'read'",
        ],
    },
    Migration {
        name: "0002_seed_worker_queues",
        description: "default broker queues: default, backup, network, heavy",
        statements: &["INSERT OR IGNORE INTO settings (key, value, updated_at) VALUES ('worker', \
             '{\"queues\":[{\"name\":\"default\",\"description\":\"Default queue\"},\
{\"name\":\"backup\",\"description\":\"Configuration backups\"},\
{\"name\":\"network\",\"description\":\"Network scanning\"},\
{\"name\":\"heavy\",\"description\":\"Bulk operations\"}],\
\"task_time_limit_secs\":3600,\"result_ttl_secs\":86400,\
\"max_tasks_per_child\":100,\"prefetch\":1}', datetime('now'))"],
    },
    Migration {
        name: "0003_hot_path_indexes",
        description: "indexes for audit paging and command history lookups",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_created_at ON audit_logs (created_at)",
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_severity ON audit_logs (severity)",
            "CREATE INDEX IF NOT EXISTS idx_agent_commands_agent ON agent_commands (agent_id, sent_at)",
            "CREATE INDEX IF NOT EXISTS idx_device_results_run ON device_results (run_id)",
            "CREATE INDEX IF NOT EXISTS idx_job_runs_template ON job_runs (template_id, status)",
        ],
    },
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<MigrationReport, StoreError> {
    ensure_tracking_table(pool).await?;

    let mut report = MigrationReport::default();
    sync_schema(pool, &mut report).await?;

    if report.tables_created > 0 || report.columns_added > 0 {
        record_migration(pool, "auto_schema_sync", "Automatic schema synchronization", None).await?;
    }

    for migration in MIGRATIONS {
        if is_applied(pool, migration.name).await? {
            continue;
        }
        info!(migration = migration.name, "applying migration");
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|source| StoreError::Migration {
                    name: migration.name.to_string(),
                    source,
                })?;
        }
        sqlx::query(
            "INSERT OR IGNORE INTO schema_migrations (migration_name, applied_at, description, checksum) \
             VALUES (?1, datetime('now'), ?2, ?3)",
        )
        .bind(migration.name)
        .bind(migration.description)
        .bind(migration.checksum())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        report.migrations_applied += 1;
    }

    if report.total_changes() == 0 {
        info!("schema is up to date");
    } else {
        info!(
            tables = report.tables_created,
            columns = report.columns_added,
            versioned = report.migrations_applied,
            "migrations complete"
        );
    }
    Ok(report)
}

async fn ensure_tracking_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             migration_name TEXT UNIQUE NOT NULL, \
             applied_at TEXT NOT NULL, \
             description TEXT, \
             checksum TEXT)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn sync_schema(pool: &SqlitePool, report: &mut MigrationReport) -> Result<(), StoreError> {
    let existing = existing_tables(pool).await?;

    for table in TABLES {
        if !existing.contains(&table.name.to_string()) {
            info!(table = table.name, "creating table");
            sqlx::query(&table.create_sql()).execute(pool).await?;
            report.tables_created += 1;
            continue;
        }

        let present = existing_columns(pool, table.name).await?;
        for column in table.columns {
            if present.contains(&column.name.to_string()) {
                continue;
            }
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {}",
                table.name,
                add_column_def(column)
            );
            info!(table = table.name, column = column.name, "adding column");
            sqlx::query(&sql).execute(pool).await?;
            report.columns_added += 1;
        }
    }
    Ok(())
}

async fn existing_tables(pool: &SqlitePool) -> Result<Vec<String>, StoreError> {
    let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table'")
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("name").map_err(StoreError::from))
        .collect()
}

async fn existing_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>, StoreError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("name").map_err(StoreError::from))
        .collect()
}

async fn is_applied(pool: &SqlitePool, name: &str) -> Result<bool, StoreError> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM schema_migrations WHERE migration_name = ?1")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(row.try_get::<i64, _>("n")? > 0)
}

async fn record_migration(
    pool: &SqlitePool,
    name: &str,
    description: &str,
    checksum: Option<&str>,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT OR IGNORE INTO schema_migrations (migration_name, applied_at, description, checksum) \
         VALUES (?1, datetime('now'), ?2, ?3)",
    )
    .bind(name)
    .bind(description)
    .bind(checksum)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = memory_pool().await;

        let first = run_migrations(&pool).await.unwrap();
        assert_eq!(first.tables_created as usize, TABLES.len());
        assert_eq!(first.migrations_applied as usize, MIGRATIONS.len());

        // Second and third passes report zero changes.
        for _ in 0..2 {
            let again = run_migrations(&pool).await.unwrap();
            assert_eq!(again.total_changes(), 0);
        }
    }

    #[tokio::test]
    async fn missing_column_is_added_to_an_existing_table() {
        let pool = memory_pool().await;
        // A pre-existing roles table missing the description column.
        sqlx::query("CREATE TABLE roles (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO roles (name) VALUES ('admin')")
            .execute(&pool)
            .await
            .unwrap();

        let report = run_migrations(&pool).await.unwrap();
        assert!(report.columns_added >= 1);

        let row = sqlx::query("SELECT description FROM roles WHERE name = 'admin'")
            .fetch_one(&pool)
            .await
            .unwrap();
        let description: String = row.try_get("description").unwrap();
        assert_eq!(description, "");
    }

    #[tokio::test]
    async fn seeded_rbac_gives_admin_every_permission() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM role_permissions rp \
             JOIN roles r ON r.id = rp.role_id WHERE r.name = 'admin'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        let admin_grants: i64 = row.try_get("n").unwrap();

        let row = sqlx::query("SELECT COUNT(*) AS n FROM permissions")
            .fetch_one(&pool)
            .await
            .unwrap();
        let total: i64 = row.try_get("n").unwrap();

        assert_eq!(admin_grants, total);
        assert!(total > 0);
    }
}
