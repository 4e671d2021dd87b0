use crate::BrokerError;
use redis::Script;
use tracing::debug;
use uuid::Uuid;

const LOCK_KEY: &str = "cockpit:scheduler:lock";

/// Short-TTL exclusive lock in the result store. One scheduler replica holds
/// it at a time; on crash the TTL lets the next replica take over.
pub struct SchedulerLock {
    client: redis::Client,
    holder: String,
    ttl_ms: u64,
}

impl SchedulerLock {
    pub fn new(result_url: &str, ttl_ms: u64) -> Result<Self, BrokerError> {
        let client = redis::Client::open(result_url)?;
        Ok(Self {
            client,
            holder: Uuid::new_v4().to_string(),
            ttl_ms,
        })
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub async fn acquire(&self) -> Result<bool, BrokerError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let outcome: Option<String> = redis::cmd("SET")
            .arg(LOCK_KEY)
            .arg(&self.holder)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_ms)
            .query_async(&mut conn)
            .await?;
        let acquired = outcome.is_some();
        if acquired {
            debug!(holder = %self.holder, "scheduler lock acquired");
        }
        Ok(acquired)
    }

    /// Extend the TTL if we still hold the lock.
    pub async fn refresh(&self) -> Result<bool, BrokerError> {
        let script = Script::new(
            "if redis.call('GET', KEYS[1]) == ARGV[1] then \
               return redis.call('PEXPIRE', KEYS[1], ARGV[2]) \
             else return 0 end",
        );
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let refreshed: i64 = script
            .key(LOCK_KEY)
            .arg(&self.holder)
            .arg(self.ttl_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(refreshed == 1)
    }

    /// Release only when we are still the holder.
    pub async fn release(&self) -> Result<(), BrokerError> {
        let script = Script::new(
            "if redis.call('GET', KEYS[1]) == ARGV[1] then \
               return redis.call('DEL', KEYS[1]) \
             else return 0 end",
        );
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = script
            .key(LOCK_KEY)
            .arg(&self.holder)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
