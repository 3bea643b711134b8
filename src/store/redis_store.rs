use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use redis::Script;
use std::sync::Arc;
use std::time::Duration;

use super::SharedStore;
use crate::shared::error::InfraError;

// Check and increment in one server-side step. A GET followed by INCR from
// the worker would let two workers both see `burst - 1` and both pass.
static CONSUME_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
    return 0
end
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 1
"#,
    )
});

static RELEASE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#,
    )
});

#[derive(Debug, Clone)]
pub struct RedisStore {
    client: Arc<redis::Client>,
}

impl RedisStore {
    pub async fn new(redis_url: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| InfraError::Store(format!("Failed to create Redis client: {e}")))?;

        let _ = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, InfraError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| InfraError::Store(format!("Redis connection error: {e}")))
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn try_consume(
        &self,
        key: &str,
        burst: u64,
        window: Duration,
    ) -> Result<bool, InfraError> {
        let mut conn = self.connection().await?;
        let taken: i64 = CONSUME_SCRIPT
            .key(key)
            .arg(burst)
            .arg(millis(window))
            .invoke_async(&mut conn)
            .await?;

        debug!("try_consume {key}: taken={}", taken == 1);
        Ok(taken == 1)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, InfraError> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, InfraError> {
        let mut conn = self.connection().await?;
        let deleted: i64 = RELEASE_SCRIPT
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;

        Ok(deleted == 1)
    }

    async fn flag(&self, key: &str, ttl: Duration) -> Result<(), InfraError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn is_flagged(&self, key: &str) -> Result<bool, InfraError> {
        let mut conn = self.connection().await?;
        let exists: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(exists == 1)
    }
}
