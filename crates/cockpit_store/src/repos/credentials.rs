use crate::error::StoreError;
use chrono::{NaiveDate, Utc};
use cockpit_model::{CredentialKind, CredentialRecord};
use cockpit_vault::{EncryptionService, VaultError};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{info, warn};

pub struct CredentialRepo<'a> {
    pool: &'a SqlitePool,
}

#[derive(Debug, Clone)]
pub struct NewCredential {
    pub name: String,
    pub source: String,
    pub username: String,
    pub kind: CredentialKind,
    pub password: Option<String>,
    pub ssh_key: Option<String>,
    pub passphrase: Option<String>,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Default)]
pub struct RotationReport {
    pub rotated: u32,
    pub failed: Vec<(i64, String)>,
}

impl<'a> CredentialRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Encrypt each present secret and insert. `(name, source)` uniqueness
    /// is enforced by the table.
    pub async fn create(
        &self,
        vault: &EncryptionService,
        new: NewCredential,
    ) -> Result<CredentialRecord, StoreError> {
        let now = Utc::now();
        let password_encrypted = new.password.as_deref().map(|p| vault.encrypt(p));
        let ssh_key_encrypted = new.ssh_key.as_deref().map(|k| vault.encrypt(k));
        let passphrase_encrypted = new.passphrase.as_deref().map(|p| vault.encrypt(p));

        let result = sqlx::query(
            "INSERT INTO credentials \
             (name, source, username, kind, password_encrypted, ssh_key_encrypted, \
              passphrase_encrypted, valid_until, is_active, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)",
        )
        .bind(&new.name)
        .bind(&new.source)
        .bind(&new.username)
        .bind(new.kind.as_str())
        .bind(&password_encrypted)
        .bind(&ssh_key_encrypted)
        .bind(&passphrase_encrypted)
        .bind(new.valid_until)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict(
                format!("credential '{}' already exists for source '{}'", new.name, new.source),
            ),
            other => StoreError::Sqlx(other),
        })?;

        Ok(CredentialRecord {
            id: result.last_insert_rowid(),
            name: new.name,
            source: new.source,
            username: new.username,
            kind: new.kind,
            password_encrypted,
            ssh_key_encrypted,
            passphrase_encrypted,
            valid_until: new.valid_until,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<CredentialRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM credentials WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_credential).transpose()
    }

    pub async fn get_by_name(
        &self,
        name: &str,
        source: &str,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM credentials WHERE name = ?1 AND source = ?2")
            .bind(name)
            .bind(source)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_credential).transpose()
    }

    pub async fn list(&self) -> Result<Vec<CredentialRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM credentials ORDER BY name")
            .fetch_all(self.pool)
            .await?;
        rows.iter().map(row_to_credential).collect()
    }

    /// Update metadata and optionally replace secrets. A `None` secret keeps
    /// the stored ciphertext untouched.
    pub async fn update(
        &self,
        vault: &EncryptionService,
        id: i64,
        username: Option<&str>,
        password: Option<&str>,
        valid_until: Option<Option<NaiveDate>>,
        is_active: Option<bool>,
    ) -> Result<CredentialRecord, StoreError> {
        let existing = self.get(id).await?.ok_or(StoreError::NotFound("credential"))?;

        let username = username.unwrap_or(&existing.username);
        let password_encrypted = match password {
            Some(plaintext) => Some(vault.encrypt(plaintext)),
            None => existing.password_encrypted.clone(),
        };
        let valid_until = valid_until.unwrap_or(existing.valid_until);
        let is_active = is_active.unwrap_or(existing.is_active);

        sqlx::query(
            "UPDATE credentials SET username = ?2, password_encrypted = ?3, valid_until = ?4, \
             is_active = ?5, updated_at = ?6 WHERE id = ?1",
        )
        .bind(id)
        .bind(username)
        .bind(&password_encrypted)
        .bind(valid_until)
        .bind(is_active)
        .bind(Utc::now())
        .execute(self.pool)
        .await?;

        self.get(id).await?.ok_or(StoreError::NotFound("credential"))
    }

    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("credential"));
        }
        Ok(())
    }

    pub async fn decrypt_password(
        &self,
        vault: &EncryptionService,
        id: i64,
    ) -> Result<String, StoreError> {
        let record = self.get(id).await?.ok_or(StoreError::NotFound("credential"))?;
        let token = record
            .password_encrypted
            .ok_or(StoreError::Vault(VaultError::Format))?;
        Ok(vault.decrypt(&token)?)
    }

    /// Re-encrypt every secret column from `old` to `new` in one
    /// transaction. Rows whose ciphertext fails under the old key are
    /// reported and left unchanged.
    pub async fn rotate_all(
        &self,
        old: &EncryptionService,
        new: &EncryptionService,
    ) -> Result<RotationReport, StoreError> {
        let rows = sqlx::query(
            "SELECT id, password_encrypted, ssh_key_encrypted, passphrase_encrypted FROM credentials",
        )
        .fetch_all(self.pool)
        .await?;

        let mut report = RotationReport::default();
        let mut tx = self.pool.begin().await?;

        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let columns = [
                ("password_encrypted", row.try_get::<Option<String>, _>("password_encrypted")?),
                ("ssh_key_encrypted", row.try_get::<Option<String>, _>("ssh_key_encrypted")?),
                ("passphrase_encrypted", row.try_get::<Option<String>, _>("passphrase_encrypted")?),
            ];

            let mut rotated: Vec<(&str, String)> = Vec::new();
            let mut row_error: Option<VaultError> = None;
            for (column, token) in columns {
                let Some(token) = token else { continue };
                match old.reencrypt_for(new, &token) {
                    Ok(next) => rotated.push((column, next)),
                    Err(err) => {
                        row_error = Some(err);
                        break;
                    }
                }
            }

            if let Some(err) = row_error {
                warn!(credential_id = id, "rotation skipped row: {err}");
                report.failed.push((id, err.to_string()));
                continue;
            }

            for (column, token) in rotated {
                let sql = format!("UPDATE credentials SET {column} = ?2, updated_at = ?3 WHERE id = ?1");
                sqlx::query(&sql)
                    .bind(id)
                    .bind(token)
                    .bind(Utc::now())
                    .execute(&mut *tx)
                    .await?;
            }
            report.rotated += 1;
        }

        tx.commit().await?;
        Ok(report)
    }

    /// First-boot bootstrap: with an empty table and both env values
    /// present, insert an initial admin credential.
    pub async fn bootstrap_initial(
        &self,
        vault: &EncryptionService,
        initial_username: Option<&str>,
        initial_password: Option<&str>,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM credentials")
            .fetch_one(self.pool)
            .await?;
        if row.try_get::<i64, _>("n")? > 0 {
            return Ok(false);
        }
        let (Some(username), Some(password)) = (initial_username, initial_password) else {
            return Ok(false);
        };

        self.create(
            vault,
            NewCredential {
                name: "Initial Admin Credential".into(),
                source: "general".into(),
                username: username.into(),
                kind: CredentialKind::Generic,
                password: Some(password.into()),
                ssh_key: None,
                passphrase: None,
                valid_until: None,
            },
        )
        .await?;
        info!(username, "created initial credential");
        Ok(true)
    }
}

fn row_to_credential(row: &SqliteRow) -> Result<CredentialRecord, StoreError> {
    let kind: String = row.try_get("kind")?;
    Ok(CredentialRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        source: row.try_get("source")?,
        username: row.try_get("username")?,
        kind: CredentialKind::from_str(&kind).map_err(StoreError::decode)?,
        password_encrypted: row.try_get("password_encrypted")?,
        ssh_key_encrypted: row.try_get("ssh_key_encrypted")?,
        passphrase_encrypted: row.try_get("passphrase_encrypted")?,
        valid_until: row.try_get("valid_until")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
