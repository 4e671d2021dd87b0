use crate::NautobotError;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::debug;

/// Redis-backed entity cache keyed `<prefix>:<entity>:<id>`. Writes through
/// the gateway invalidate the entity key and its list index.
pub struct EntityCache {
    client: redis::Client,
    prefix: String,
    ttl_secs: u64,
}

impl EntityCache {
    pub fn new(redis_url: &str, prefix: &str, ttl_secs: u64) -> Result<Self, NautobotError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| NautobotError::GraphQl(format!("cache init: {err}")))?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
            ttl_secs,
        })
    }

    fn key(&self, entity: &str, id: &str) -> String {
        format!("{}:{}:{}", self.prefix, entity, id)
    }

    fn list_key(&self, entity: &str) -> String {
        format!("{}:{}:__list", self.prefix, entity)
    }

    /// Cache misses and cache infrastructure failures both return None; the
    /// caller falls through to the upstream.
    pub async fn get(&self, entity: &str, id: &str) -> Option<Value> {
        let mut conn = self.client.get_multiplexed_async_connection().await.ok()?;
        let raw: Option<String> = conn.get(self.key(entity, id)).await.ok()?;
        raw.and_then(|raw| serde_json::from_str(&raw).ok())
    }

    pub async fn put(&self, entity: &str, id: &str, value: &Value) {
        let Ok(mut conn) = self.client.get_multiplexed_async_connection().await else {
            return;
        };
        let _: Result<(), _> = conn
            .set_ex(self.key(entity, id), value.to_string(), self.ttl_secs)
            .await;
    }

    pub async fn get_list(&self, entity: &str) -> Option<Value> {
        let mut conn = self.client.get_multiplexed_async_connection().await.ok()?;
        let raw: Option<String> = conn.get(self.list_key(entity)).await.ok()?;
        raw.and_then(|raw| serde_json::from_str(&raw).ok())
    }

    pub async fn put_list(&self, entity: &str, value: &Value) {
        let Ok(mut conn) = self.client.get_multiplexed_async_connection().await else {
            return;
        };
        let _: Result<(), _> = conn
            .set_ex(self.list_key(entity), value.to_string(), self.ttl_secs)
            .await;
    }

    /// Invalidate one entity and its list index after a write.
    pub async fn invalidate(&self, entity: &str, id: &str) {
        let Ok(mut conn) = self.client.get_multiplexed_async_connection().await else {
            return;
        };
        debug!(entity, id, "cache invalidate");
        let _: Result<(), _> = conn
            .del::<_, ()>(vec![self.key(entity, id), self.list_key(entity)])
            .await;
    }
}
