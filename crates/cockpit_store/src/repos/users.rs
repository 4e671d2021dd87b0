use crate::error::StoreError;
use chrono::{DateTime, Utc};
use cockpit_model::User;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub struct UserRepo<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        username: &str,
        display_name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (username, display_name, email, is_active, password_hash, created_at) \
             VALUES (?1, ?2, ?3, 1, ?4, ?5)",
        )
        .bind(username)
        .bind(display_name)
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("user '{}' already exists", username))
            }
            other => StoreError::Sqlx(other),
        })?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            email: email.to_string(),
            is_active: true,
            password_hash: password_hash.to_string(),
            last_login: None,
            created_at: now,
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY username")
            .fetch_all(self.pool)
            .await?;
        rows.iter().map(row_to_user).collect()
    }

    pub async fn touch_last_login(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_active(&self, id: i64, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_api_key(&self, user_id: i64, api_key: Option<&str>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_profiles (user_id, api_key) VALUES (?1, ?2) \
             ON CONFLICT (user_id) DO UPDATE SET api_key = excluded.api_key",
        )
        .bind(user_id)
        .bind(api_key)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_api_key(&self, api_key: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT u.* FROM users u \
             JOIN user_profiles p ON p.user_id = u.id \
             WHERE p.api_key = ?1 AND p.api_key IS NOT NULL",
        )
        .bind(api_key)
        .fetch_optional(self.pool)
        .await?;
        row.as_ref().map(row_to_user).transpose()
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        is_active: row.try_get("is_active")?,
        password_hash: row.try_get("password_hash")?,
        last_login: row.try_get::<Option<DateTime<Utc>>, _>("last_login")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use crate::Store;

    #[tokio::test]
    async fn create_lookup_and_api_key() {
        let store = Store::connect_memory().await.unwrap();
        store.migrate().await.unwrap();

        let user = store
            .users()
            .create("admin", "Admin", "admin@example.net", "$pbkdf2-sha256$x")
            .await
            .unwrap();
        assert!(user.id > 0);

        let fetched = store.users().get_by_username("admin").await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert!(fetched.last_login.is_none());

        store.users().touch_last_login(user.id).await.unwrap();
        let fetched = store.users().get(user.id).await.unwrap().unwrap();
        assert!(fetched.last_login.is_some());

        store
            .users()
            .set_api_key(user.id, Some("key-123"))
            .await
            .unwrap();
        let by_key = store.users().get_by_api_key("key-123").await.unwrap().unwrap();
        assert_eq!(by_key.username, "admin");
        assert!(store.users().get_by_api_key("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let store = Store::connect_memory().await.unwrap();
        store.migrate().await.unwrap();

        store
            .users()
            .create("admin", "", "", "h")
            .await
            .unwrap();
        let err = store.users().create("admin", "", "", "h").await.unwrap_err();
        assert!(matches!(err, crate::StoreError::Conflict(_)));
    }
}
