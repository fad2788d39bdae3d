//! Cache-aside manager.
//!
//! ## Read path
//!
//! | Store reply            | Outcome                                        |
//! |------------------------|------------------------------------------------|
//! | value                  | decoded and returned, loader not called         |
//! | nil marker             | `CacheError::NotFound`, loader not called       |
//! | miss                   | coalesced load, result written back             |
//! | unreachable / timeout  | loader called directly, cache untouched         |
//!
//! Values are stored as JSON. The nil marker is not valid JSON, so it cannot
//! collide with a real value.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use octofhir_kv::KvClient;

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::lock::DistributedLock;
use crate::metrics;
use crate::singleflight::{SharedLoad, SingleFlight};

/// Value written for a cached negative result.
pub const NIL_MARKER: &[u8] = b"<nil>";

/// SCAN COUNT hint and DEL batch size for pattern deletes.
pub const DELETE_BATCH_SIZE: usize = 100;

/// Largest jitter as a fraction of the base TTL.
const JITTER_DIVISOR: u64 = 5;

pub fn is_nil_marker(bytes: &[u8]) -> bool {
    bytes == NIL_MARKER
}

/// Adds a random `[0, base/5]` to `base`, at millisecond granularity.
pub fn jittered_ttl(base: Duration) -> Duration {
    let max_jitter_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX) / JITTER_DIVISOR;
    if max_jitter_ms == 0 {
        return base;
    }
    let jitter_ms = rand::thread_rng().gen_range(0..=max_jitter_ms);
    base + Duration::from_millis(jitter_ms)
}

/// Read-through cache over the shared store.
///
/// Cloning is cheap; clones share the store client and the in-flight load
/// table, so coalescing applies across clones within the process.
#[derive(Clone, Debug)]
pub struct CacheManager {
    client: KvClient,
    config: Arc<CacheConfig>,
    flights: Arc<SingleFlight>,
}

impl CacheManager {
    pub fn new(client: KvClient, config: CacheConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
            flights: Arc::new(SingleFlight::new()),
        }
    }

    pub fn client(&self) -> &KvClient {
        &self.client
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ==================== Cache-aside ====================

    /// Returns the cached value for `key`, loading and caching it on a miss.
    ///
    /// `load` returns `Ok(None)` when the source has no data; that outcome is
    /// cached as the nil marker for `negative_ttl_secs` and reported as
    /// [`CacheError::NotFound`]. Loader errors are returned to every
    /// coalesced caller and are not cached.
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, ttl: Duration, load: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        match self.client.get(key).await {
            Ok(Some(bytes)) if is_nil_marker(&bytes) => {
                tracing::debug!(key = %key, "Cache negative hit");
                metrics::record_negative_hit();
                return Err(CacheError::not_found(key));
            }
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    tracing::debug!(key = %key, "Cache hit");
                    metrics::record_cache_hit();
                    return Ok(value);
                }
                Err(e) => {
                    // Reloading overwrites the entry.
                    tracing::warn!(key = %key, error = %e, "Undecodable cache entry, reloading");
                    metrics::record_cache_miss();
                }
            },
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                metrics::record_cache_miss();
            }
            Err(e) if e.is_transport() => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Cache store unavailable, loading without cache"
                );
                metrics::record_fail_open();
                return match load().await {
                    Ok(Some(value)) => Ok(value),
                    Ok(None) => Err(CacheError::not_found(key)),
                    Err(e) => Err(CacheError::load(e)),
                };
            }
            Err(e) => return Err(e.into()),
        }

        let flight = self
            .flights
            .run(key, || self.load_and_fill(key, ttl, load))
            .await;
        if flight.shared {
            metrics::record_coalesced();
        }

        match flight.result? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(CacheError::serialization),
            None => Err(CacheError::not_found(key)),
        }
    }

    /// [`get_or_load`](Self::get_or_load) with the TTL configured for `use_case`.
    pub async fn get_or_load_for<T, F, Fut>(
        &self,
        use_case: &str,
        key: &str,
        load: F,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        self.get_or_load(key, self.config.ttl_for(use_case), load)
            .await
    }

    /// Leader side of a coalesced load: runs the loader and writes the result
    /// back. A failed write is logged, not returned.
    async fn load_and_fill<T, F, Fut>(&self, key: &str, ttl: Duration, load: F) -> SharedLoad
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        let loaded = load().await.map_err(|e| {
            tracing::debug!(key = %key, error = %e, "Cache loader failed");
            CacheError::load(e)
        })?;

        let Some(value) = loaded else {
            self.write(key, NIL_MARKER, self.config.negative_ttl()).await;
            return Ok(None);
        };

        let bytes = serde_json::to_vec(&value).map_err(CacheError::serialization)?;
        self.write(key, &bytes, jittered_ttl(ttl)).await;
        Ok(Some(Arc::new(bytes)))
    }

    async fn write(&self, key: &str, bytes: &[u8], ttl: Duration) {
        if let Err(e) = self.client.set(key, bytes, Some(ttl)).await {
            tracing::warn!(key = %key, error = %e, "Failed to populate cache");
            metrics::record_write_error();
        }
    }

    // ==================== Direct access ====================

    /// Reads `key` without loading. `Ok(None)` is a miss; the nil marker is
    /// [`CacheError::NotFound`].
    pub async fn get_object<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(bytes) = self.client.get(key).await? else {
            metrics::record_cache_miss();
            return Ok(None);
        };
        if is_nil_marker(&bytes) {
            metrics::record_negative_hit();
            return Err(CacheError::not_found(key));
        }
        metrics::record_cache_hit();
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(CacheError::serialization)
    }

    /// Writes `value` under `key` with a jittered `ttl`. `None` writes the nil
    /// marker with the fixed negative TTL instead.
    pub async fn set_object<T: Serialize>(
        &self,
        key: &str,
        value: Option<&T>,
        ttl: Duration,
    ) -> CacheResult<()> {
        match value {
            Some(value) => {
                let bytes = serde_json::to_vec(value).map_err(CacheError::serialization)?;
                self.client
                    .set(key, &bytes, Some(jittered_ttl(ttl)))
                    .await?;
            }
            None => {
                self.client
                    .set(key, NIL_MARKER, Some(self.config.negative_ttl()))
                    .await?;
            }
        }
        Ok(())
    }

    // ==================== Invalidation ====================

    /// Deletes specific keys. Returns how many existed.
    pub async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let removed = self.client.del(keys).await?;
        metrics::record_invalidated(removed);
        tracing::debug!(requested = keys.len(), removed, "Cache keys invalidated");
        Ok(removed)
    }

    /// Deletes every key starting with `pattern` (SCAN `pattern*`), in batches
    /// of [`DELETE_BATCH_SIZE`]. Returns how many keys were removed.
    ///
    /// Not atomic: keys written while the scan runs may survive.
    pub async fn delete_by_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let matcher = format!("{pattern}*");
        let mut cursor = 0;
        let mut removed = 0;
        let mut batch: Vec<String> = Vec::with_capacity(DELETE_BATCH_SIZE);

        loop {
            let (next, keys) = self
                .client
                .scan(cursor, &matcher, DELETE_BATCH_SIZE)
                .await?;
            for key in keys {
                batch.push(key);
                if batch.len() >= DELETE_BATCH_SIZE {
                    removed += self.client.del(&batch).await?;
                    batch.clear();
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        if !batch.is_empty() {
            removed += self.client.del(&batch).await?;
        }

        metrics::record_invalidated(removed);
        tracing::debug!(pattern = %pattern, removed, "Cache pattern invalidated");
        Ok(removed)
    }

    // ==================== Locks ====================

    /// Acquires the lock at `key` with the configured TTL, retrying a fixed
    /// number of times with a fixed delay.
    pub async fn acquire_lock(&self, key: &str) -> CacheResult<DistributedLock> {
        let lock = &self.config.lock;
        let ttl = lock.ttl();
        let attempts = lock.retry_count.max(1);
        let token = Uuid::new_v4().to_string();

        for attempt in 1..=attempts {
            if self.client.set_nx(key, token.as_bytes(), ttl).await? {
                tracing::debug!(key = %key, attempt, "Lock acquired");
                metrics::record_lock_acquired();
                return Ok(DistributedLock::new(
                    self.client.clone(),
                    key.to_string(),
                    token,
                    ttl,
                ));
            }
            if attempt < attempts {
                tokio::time::sleep(lock.retry_delay()).await;
            }
        }

        tracing::debug!(key = %key, attempts, "Lock busy");
        metrics::record_lock_busy();
        Err(CacheError::lock_busy(key, attempts))
    }

    /// [`acquire_lock`](Self::acquire_lock) that gives up as soon as `cancel`
    /// fires. A SET issued just before cancellation may still land; that lock
    /// then lapses after its TTL.
    pub async fn acquire_lock_with_cancel(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> CacheResult<DistributedLock> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CacheError::cancelled(key)),
            result = self.acquire_lock(key) => result,
        }
    }
}
