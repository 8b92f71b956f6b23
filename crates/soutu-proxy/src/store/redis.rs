//! Redis-backed store shared by every handler instance
//!
//! TTLs map onto `SET EX`; the conditional increment runs as a Lua script so
//! the compare and the write happen in one Redis round trip. Reads, writes
//! and deletes are retried; the increment is not, since a lost reply would
//! count one request twice.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisResult, Script};
use tracing::{debug, error, warn};

use super::KvStore;
use crate::error::{ProxyError, ProxyResult};

const INCREMENT_BELOW: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
  return -1
end
local next = redis.call('INCR', KEYS[1])
if next == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return next
";

/// Store talking to a Redis server
#[derive(Debug, Clone)]
pub struct RedisStore {
    client: Client,
    increment_below: Script,
    max_retries: u32,
}

impl RedisStore {
    /// Connect and verify the server answers `PING`
    ///
    /// # Errors
    ///
    /// Returns a storage error if the URL is invalid or the server is
    /// unreachable.
    pub async fn connect(url: &str) -> ProxyResult<Self> {
        let client = Client::open(url)
            .map_err(|e| ProxyError::storage(format!("Failed to create Redis client: {e}")))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ProxyError::storage(format!("Failed to connect to Redis: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ProxyError::storage(format!("Redis ping failed: {e}")))?;

        debug!("Redis connection established");

        Ok(Self::from_client(client))
    }

    fn from_client(client: Client) -> Self {
        Self {
            client,
            increment_below: Script::new(INCREMENT_BELOW),
            max_retries: 3,
        }
    }

    /// Run `operation` on a fresh multiplexed connection, retrying transient
    /// failures with linear backoff
    async fn with_retries<F, Fut, T>(&self, operation: F) -> ProxyResult<T>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let result = match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => operation(conn).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if attempts >= self.max_retries => {
                    error!(attempts, error = %e, "Redis operation failed");
                    return Err(ProxyError::storage(format!("Redis operation failed: {e}")));
                }
                Err(e) => {
                    warn!(attempt = attempts, error = %e, "Redis operation failed, retrying");
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempts))).await;
                }
            }
        }
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> ProxyResult<Option<String>> {
        self.with_retries(|mut conn| async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> ProxyResult<()> {
        let secs = ttl_secs(ttl);
        self.with_retries(|mut conn| async move { conn.set_ex::<_, _, ()>(key, value, secs).await })
            .await
    }

    async fn delete(&self, key: &str) -> ProxyResult<()> {
        self.with_retries(|mut conn| async move { conn.del::<_, ()>(key).await })
            .await
    }

    async fn increment_below(
        &self,
        key: &str,
        limit: u64,
        ttl: Duration,
    ) -> ProxyResult<Option<u64>> {
        // Only acquiring the connection is retried
        let mut conn = self
            .with_retries(|conn| async move { RedisResult::Ok(conn) })
            .await?;
        let count: i64 = self
            .increment_below
            .key(key)
            .arg(limit)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                error!(error = %e, "Redis conditional increment failed");
                ProxyError::storage(format!("Redis operation failed: {e}"))
            })?;
        Ok(u64::try_from(count).ok())
    }
}
