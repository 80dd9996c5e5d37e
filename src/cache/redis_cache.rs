use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{CacheError, DistributedCache, redis_url};
use crate::config::CacheSettings;

/// Redis-backed [`DistributedCache`].
///
/// Holds a single [`ConnectionManager`]: a multiplexed connection that
/// reconnects on its own after network failures. Cloning the manager is
/// cheap and every clone shares the same socket, so each call works on its
/// own clone rather than locking.
///
/// Every logical key is prefixed with the configured instance name, which
/// keeps this application's entries apart from anything else stored in the
/// same Redis database.
pub struct RedisCache {
    connection: ConnectionManager,
    instance_name: String,
    operation_timeout: Duration,
}

impl RedisCache {
    /// Opens the connection described by `settings` and verifies it with `PING`.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidConnectionString`] if the connection string
    ///   cannot be turned into a Redis URL.
    /// - [`CacheError::Timeout`] if connecting or pinging exceeds the
    ///   configured operation timeout.
    /// - [`CacheError::Redis`] for any client or server error.
    pub async fn connect(settings: &CacheSettings) -> Result<Self, CacheError> {
        let url = redis_url(&settings.connection_string)?;
        let operation_timeout = settings.operation_timeout();
        let client = Client::open(url.as_str())?;

        let connection = bounded(
            "connect",
            operation_timeout,
            ConnectionManager::new(client),
        )
        .await?;

        let cache = Self {
            connection,
            instance_name: settings.instance_name.clone(),
            operation_timeout,
        };
        cache.ping().await?;

        info!(
            instance = %cache.instance_name,
            timeout_ms = operation_timeout.as_millis() as u64,
            "redis cache connection established"
        );
        Ok(cache)
    }

    /// Round-trips a `PING` to the server.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        let pong: String = bounded(
            "ping",
            self.operation_timeout,
            redis::cmd("PING").query_async(&mut connection),
        )
        .await?;
        debug!(reply = %pong, "redis ping");
        Ok(())
    }
}

#[async_trait]
impl DistributedCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let physical = physical_key(&self.instance_name, key);
        let mut connection = self.connection.clone();
        bounded("GET", self.operation_timeout, connection.get(&physical))
            .await
            .inspect_err(|e| warn!(key = %physical, error = %e, "redis GET failed"))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let physical = physical_key(&self.instance_name, key);
        let mut connection = self.connection.clone();
        bounded(
            "SET",
            self.operation_timeout,
            connection.set(&physical, value),
        )
        .await
        .inspect_err(|e| warn!(key = %physical, error = %e, "redis SET failed"))
    }
}

/// Returns the Redis key that stores the logical `key`: the instance name
/// followed directly by the key, with no separator.
fn physical_key(instance_name: &str, key: &str) -> String {
    format!("{instance_name}{key}")
}

/// Awaits `operation`, failing with [`CacheError::Timeout`] once `limit` elapses.
async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    future: impl Future<Output = RedisResult<T>>,
) -> Result<T, CacheError> {
    match timeout(limit, future).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CacheError::Timeout {
            operation,
            after: limit,
        }),
    }
}
