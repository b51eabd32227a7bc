//! Redis-backed cache store.

use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::*;
use tracing::info;

use super::{ttl_secs, CacheError, CacheStore};

/// Atomic counter increment that starts the window on first use.
///
/// Also re-arms the expiry if the key somehow lost it, so a counter can never
/// become permanent.
const INCR_WINDOW_LUA: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 or redis.call('TTL', KEYS[1]) == -1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Key probed by `ping`; its value is irrelevant.
const HEALTH_KEY: &str = "health:probe";

/// Connect to Redis and wait for the connection to be established.
pub async fn create_redis_client(redis_url: &str) -> Result<Client, CacheError> {
    let config = Config::from_url(redis_url)?;
    let client = Client::new(config, None, None, None);
    client.connect();
    client.wait_for_connect().await?;

    info!("Connected to Redis");
    Ok(client)
}

/// Cache store on a shared Redis instance.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.client.get::<Option<String>, _>(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let expiration = ttl.map(|ttl| Expiration::EX(ttl_secs(ttl)));
        self.client
            .set::<(), _, _>(key, value, expiration, None, false)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.client.del::<i64, _>(key).await?;
        Ok(())
    }

    async fn incr_in_window(&self, key: &str, window: Duration) -> Result<i64, CacheError> {
        let count: i64 = self
            .client
            .eval(
                INCR_WINDOW_LUA,
                vec![key],
                vec![ttl_secs(window).to_string()],
            )
            .await?;
        Ok(count)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        // SET NX replies OK when written and nil when the key already exists.
        let written: Option<String> = self
            .client
            .set(
                key,
                value,
                Some(Expiration::EX(ttl_secs(ttl))),
                Some(SetOptions::NX),
                false,
            )
            .await?;
        Ok(written.is_some())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.client.exists::<i64, _>(HEALTH_KEY).await?;
        Ok(())
    }
}
