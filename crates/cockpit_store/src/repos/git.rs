use crate::error::StoreError;
use cockpit_model::{GitAuthType, GitRepository};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub struct GitRepositoryRepo<'a> {
    pool: &'a SqlitePool,
}

impl<'a> GitRepositoryRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, repo: &GitRepository) -> Result<GitRepository, StoreError> {
        let result = sqlx::query(
            "INSERT INTO git_repositories (name, url, branch, category, credential_name, \
             auth_type, verify_ssl, path, active) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&repo.name)
        .bind(&repo.url)
        .bind(&repo.branch)
        .bind(&repo.category)
        .bind(&repo.credential_name)
        .bind(auth_type_str(repo.auth_type))
        .bind(repo.verify_ssl)
        .bind(&repo.path)
        .bind(repo.active)
        .execute(self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("git repository '{}' already exists", repo.name))
            }
            other => StoreError::Sqlx(other),
        })?;

        let mut created = repo.clone();
        created.id = result.last_insert_rowid();
        Ok(created)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<GitRepository>, StoreError> {
        let row = sqlx::query("SELECT * FROM git_repositories WHERE name = ?1")
            .bind(name)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_repo).transpose()
    }

    pub async fn list_active(&self, category: Option<&str>) -> Result<Vec<GitRepository>, StoreError> {
        let rows = match category {
            Some(category) => {
                sqlx::query(
                    "SELECT * FROM git_repositories WHERE active = 1 AND category = ?1 ORDER BY name",
                )
                .bind(category)
                .fetch_all(self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM git_repositories WHERE active = 1 ORDER BY name")
                    .fetch_all(self.pool)
                    .await?
            }
        };
        rows.iter().map(row_to_repo).collect()
    }

    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM git_repositories WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("git repository"));
        }
        Ok(())
    }
}

fn auth_type_str(auth: GitAuthType) -> &'static str {
    match auth {
        GitAuthType::Token => "token",
        GitAuthType::SshKey => "ssh_key",
        GitAuthType::None => "none",
    }
}

fn row_to_repo(row: &SqliteRow) -> Result<GitRepository, StoreError> {
    let auth_type: String = row.try_get("auth_type")?;
    Ok(GitRepository {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        branch: row.try_get("branch")?,
        category: row.try_get("category")?,
        credential_name: row.try_get("credential_name")?,
        auth_type: match auth_type.as_str() {
            "token" => GitAuthType::Token,
            "ssh_key" => GitAuthType::SshKey,
            _ => GitAuthType::None,
        },
        verify_ssl: row.try_get("verify_ssl")?,
        path: row.try_get("path")?,
        active: row.try_get("active")?,
    })
}
