use crate::error::StoreError;
use chrono::Utc;
use cockpit_model::{
    CacheSettings, CheckMkSettings, DeviceOffboardingSettings, GitSettings, NautobotDefaults,
    NautobotSettings, WorkerSettings,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// Singleton setting groups stored one JSON document per key.
pub struct SettingsRepo<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SettingsRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn load<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StoreError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(self.pool)
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.try_get("value")?;
                serde_json::from_str(&raw).map_err(StoreError::decode)
            }
            None => Ok(T::default()),
        }
    }

    pub async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(StoreError::decode)?;
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(raw)
        .bind(Utc::now())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn nautobot(&self) -> Result<NautobotSettings, StoreError> {
        self.load("nautobot").await
    }

    pub async fn checkmk(&self) -> Result<CheckMkSettings, StoreError> {
        self.load("checkmk").await
    }

    pub async fn git(&self) -> Result<GitSettings, StoreError> {
        self.load("git").await
    }

    pub async fn cache(&self) -> Result<CacheSettings, StoreError> {
        self.load("cache").await
    }

    pub async fn worker(&self) -> Result<WorkerSettings, StoreError> {
        self.load("worker").await
    }

    pub async fn nautobot_defaults(&self) -> Result<NautobotDefaults, StoreError> {
        self.load("nautobot_defaults").await
    }

    pub async fn device_offboarding(&self) -> Result<DeviceOffboardingSettings, StoreError> {
        self.load("device_offboarding").await
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;
    use cockpit_model::{NautobotSettings, WorkerSettings};

    #[tokio::test]
    async fn missing_key_yields_default() {
        let store = Store::connect_memory().await.unwrap();
        store.migrate().await.unwrap();

        let nautobot = store.settings().nautobot().await.unwrap();
        assert!(nautobot.url.is_empty());
    }

    #[tokio::test]
    async fn seeded_worker_settings_define_four_queues() {
        let store = Store::connect_memory().await.unwrap();
        store.migrate().await.unwrap();

        let worker: WorkerSettings = store.settings().worker().await.unwrap();
        let names: Vec<&str> = worker.queues.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["default", "backup", "network", "heavy"]);
        assert_eq!(worker.prefetch, 1);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = Store::connect_memory().await.unwrap();
        store.migrate().await.unwrap();

        let value = NautobotSettings {
            url: "https://nautobot.example.net".into(),
            token: "abc123".into(),
            verify_ssl: true,
            timeout_secs: Some(30),
        };
        store.settings().save("nautobot", &value).await.unwrap();
        let loaded = store.settings().nautobot().await.unwrap();
        assert_eq!(loaded.url, value.url);
        assert_eq!(loaded.timeout_secs, Some(30));
    }
}
