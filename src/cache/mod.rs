//! Distributed cache capability and its backends.
//!
//! The request handler only sees [`DistributedCache`]: a string-to-string
//! store with `get` and `set`. Two backends implement it:
//!
//! - [`RedisCache`] — the production backend, one multiplexed, auto-reconnecting
//!   connection shared by every request.
//! - [`InMemoryCache`] — a process-local map for development and tests.
//!
//! Neither backend expires, evicts, or deletes entries; lifecycle belongs to
//! whoever operates the cache service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{CacheBackend, CacheSettings};

mod connection;
mod memory;
mod redis_cache;

pub use connection::redis_url;
pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;

/// Errors raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("invalid cache connection string: {0}")]
    InvalidConnectionString(String),
}

/// A shared key-value store used as a memoization layer.
///
/// Implementations must be safe to share across Tokio tasks; callers hold
/// them as `Arc<dyn DistributedCache>` and never reconfigure them after
/// startup.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Reads the value stored under `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key`, overwriting any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// Opens the backend selected by `settings`.
///
/// Called once at startup; the returned handle is shared by every request.
pub async fn open(settings: &CacheSettings) -> Result<Arc<dyn DistributedCache>, CacheError> {
    match settings.backend {
        CacheBackend::Redis => Ok(Arc::new(RedisCache::connect(settings).await?)),
        CacheBackend::Memory => {
            info!("using in-process memory cache");
            Ok(Arc::new(InMemoryCache::new()))
        }
    }
}
