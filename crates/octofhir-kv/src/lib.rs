//! Namespaced key-value access for the cache manager and rate limiters.
//!
//! ## Backends
//!
//! - **Redis** ([`RedisStore`]): pooled connections, per-command deadlines,
//!   Lua scripts for the atomic multi-step operations. Required whenever more
//!   than one process coordinates through the store.
//! - **Memory** ([`MemoryStore`]): single-process store with the same
//!   semantics, used when Redis is disabled and in tests.
//!
//! Consumers hold a [`KvClient`], which prefixes every key with the configured
//! namespace.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod memory;
pub mod redis_store;
pub mod scripts;
pub mod store;

use std::sync::Arc;

pub use client::KvClient;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use config::RedisConfig;
pub use error::{ErrorCategory, KvError, KvResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{
    KeyTtl, KvStore, SlidingWindowOutcome, SlidingWindowParams, TokenBucketOutcome,
    TokenBucketParams,
};

/// Create a store client based on configuration.
///
/// ## Graceful Degradation
///
/// - **Redis disabled**: returns a client over the in-process memory store.
/// - **Redis enabled**: builds the pool and checks out one connection. If
///   either step fails the error is returned, unless
///   `fallback_to_memory` is set; then the memory store is used and
///   coordination is local to this instance.
pub async fn create_kv_client(config: &RedisConfig) -> KvResult<KvClient> {
    if !config.enabled {
        tracing::info!("Redis disabled, using in-process store");
        return Ok(KvClient::memory(config.namespace.clone()));
    }

    tracing::info!(url = %config.url, namespace = %config.namespace, "Connecting to Redis");

    match connect_redis(config).await {
        Ok(store) => {
            tracing::info!("Connected to Redis");
            Ok(KvClient::new(Arc::new(store), config.namespace.clone()))
        }
        Err(e) if config.fallback_to_memory => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-process store."
            );
            Ok(KvClient::memory(config.namespace.clone()))
        }
        Err(e) => {
            tracing::error!(error = %e, url = %config.url, "Failed to connect to Redis");
            Err(e)
        }
    }
}

/// Builds the Redis pool and verifies connectivity, without fallback.
pub async fn connect_redis(config: &RedisConfig) -> KvResult<RedisStore> {
    let timeout = config.pool_timeout();

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);
    redis_config.pool = Some(pool_config);

    let pool = redis_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| KvError::unavailable(format!("failed to create Redis pool: {e}")))?;

    let store = RedisStore::new(pool, config.command_timeout());
    store.ping().await?;
    Ok(store)
}
