//! Token-owned distributed lock.

use std::time::Duration;

use octofhir_kv::KvClient;

use crate::error::CacheResult;

/// A held lock. Ownership is the random token stored as the key's value;
/// release and refresh act only while the key still holds that token.
///
/// Dropping a `DistributedLock` does not release it: the key expires after
/// its TTL. Call [`release`](Self::release) when done.
#[derive(Debug)]
#[must_use = "a lock that is never released is held until its TTL expires"]
pub struct DistributedLock {
    client: KvClient,
    key: String,
    token: String,
    ttl: Duration,
}

impl DistributedLock {
    pub(crate) fn new(client: KvClient, key: String, token: String, ttl: Duration) -> Self {
        Self {
            client,
            key,
            token,
            ttl,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Deletes the lock if still owned. Returns `false` when the lock had
    /// already expired or was taken over by another holder.
    pub async fn release(&self) -> CacheResult<bool> {
        let released = self
            .client
            .compare_and_delete(&self.key, self.token.as_bytes())
            .await?;
        if released {
            tracing::debug!(key = %self.key, "Lock released");
        } else {
            tracing::debug!(key = %self.key, "Lock release skipped, no longer owner");
        }
        Ok(released)
    }

    /// Resets the lock TTL if still owned.
    pub async fn refresh(&self) -> CacheResult<bool> {
        self.refresh_for(self.ttl).await
    }

    /// Resets the lock TTL to `ttl` if still owned.
    pub async fn refresh_for(&self, ttl: Duration) -> CacheResult<bool> {
        Ok(self
            .client
            .compare_and_expire(&self.key, self.token.as_bytes(), ttl)
            .await?)
    }
}
