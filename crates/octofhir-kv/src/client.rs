//! Namespaced client shared by the cache manager and the limiters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::KvResult;
use crate::memory::MemoryStore;
use crate::store::{
    KeyTtl, KvStore, SlidingWindowOutcome, SlidingWindowParams, TokenBucketOutcome,
    TokenBucketParams,
};

/// Handle to the shared store with a process-wide key prefix.
///
/// Every key passed in is logical; the client stores it as
/// `<namespace>:<key>`. Cloning is cheap and clones share the store.
#[derive(Clone)]
pub struct KvClient {
    store: Arc<dyn KvStore>,
    namespace: Arc<str>,
}

impl std::fmt::Debug for KvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvClient")
            .field("backend", &self.store.backend())
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl KvClient {
    pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> Self {
        let namespace: String = namespace.into();
        Self {
            store,
            namespace: namespace.trim_end_matches(':').into(),
        }
    }

    /// Client over a fresh in-process store.
    pub fn memory(namespace: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryStore::new()), namespace)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Joins logical key segments with `:`.
    pub fn key(segments: &[&str]) -> String {
        segments.join(":")
    }

    /// The physical key stored for a logical key.
    pub fn full_key(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.namespace, key)
        }
    }

    fn full_keys(&self, keys: &[String]) -> Vec<String> {
        keys.iter().map(|k| self.full_key(k)).collect()
    }

    fn strip<'a>(&self, key: &'a str) -> &'a str {
        if self.namespace.is_empty() {
            return key;
        }
        key.strip_prefix(&*self.namespace)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(key)
    }

    pub async fn ping(&self) -> KvResult<()> {
        self.store.ping().await
    }

    // ==================== Strings ====================

    pub async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        self.store.get(&self.full_key(key)).await
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> KvResult<()> {
        self.store.set(&self.full_key(key), value, ttl).await
    }

    pub async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> KvResult<bool> {
        self.store.set_nx(&self.full_key(key), value, ttl).await
    }

    pub async fn set_many(
        &self,
        entries: &[(String, Vec<u8>)],
        ttl: Option<Duration>,
    ) -> KvResult<()> {
        let entries: Vec<(String, Vec<u8>)> = entries
            .iter()
            .map(|(k, v)| (self.full_key(k), v.clone()))
            .collect();
        self.store.set_many(&entries, ttl).await
    }

    pub async fn del(&self, keys: &[String]) -> KvResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.store.del(&self.full_keys(keys)).await
    }

    pub async fn exists(&self, key: &str) -> KvResult<bool> {
        self.store.exists(&self.full_key(key)).await
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool> {
        self.store.expire(&self.full_key(key), ttl).await
    }

    pub async fn ttl(&self, key: &str) -> KvResult<KeyTtl> {
        self.store.ttl(&self.full_key(key)).await
    }

    pub async fn mget(&self, keys: &[String]) -> KvResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.store.mget(&self.full_keys(keys)).await
    }

    // ==================== Hashes ====================

    pub async fn hset(&self, key: &str, fields: &[(String, Vec<u8>)]) -> KvResult<u64> {
        self.store.hset(&self.full_key(key), fields).await
    }

    pub async fn hget(&self, key: &str, field: &str) -> KvResult<Option<Vec<u8>>> {
        self.store.hget(&self.full_key(key), field).await
    }

    pub async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, Vec<u8>>> {
        self.store.hgetall(&self.full_key(key)).await
    }

    pub async fn hdel(&self, key: &str, fields: &[String]) -> KvResult<u64> {
        self.store.hdel(&self.full_key(key), fields).await
    }

    pub async fn hmget(&self, key: &str, fields: &[String]) -> KvResult<Vec<Option<Vec<u8>>>> {
        self.store.hmget(&self.full_key(key), fields).await
    }

    // ==================== Sorted sets ====================

    pub async fn zadd(&self, key: &str, score: f64, member: &str) -> KvResult<bool> {
        self.store.zadd(&self.full_key(key), score, member).await
    }

    pub async fn zrem(&self, key: &str, member: &str) -> KvResult<bool> {
        self.store.zrem(&self.full_key(key), member).await
    }

    pub async fn zscore(&self, key: &str, member: &str) -> KvResult<Option<f64>> {
        self.store.zscore(&self.full_key(key), member).await
    }

    pub async fn zrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>> {
        self.store.zrange(&self.full_key(key), start, stop).await
    }

    pub async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> KvResult<u64> {
        self.store
            .zremrangebyscore(&self.full_key(key), min, max)
            .await
    }

    pub async fn zcard(&self, key: &str) -> KvResult<u64> {
        self.store.zcard(&self.full_key(key)).await
    }

    // ==================== Lists ====================

    pub async fn lpush(&self, key: &str, value: &[u8]) -> KvResult<u64> {
        self.store.lpush(&self.full_key(key), value).await
    }

    pub async fn rpush(&self, key: &str, value: &[u8]) -> KvResult<u64> {
        self.store.rpush(&self.full_key(key), value).await
    }

    pub async fn lpop(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        self.store.lpop(&self.full_key(key)).await
    }

    pub async fn rpop(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        self.store.rpop(&self.full_key(key)).await
    }

    /// Blocking pop; the returned key is logical (prefix stripped).
    pub async fn brpop(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> KvResult<Option<(String, Vec<u8>)>> {
        let popped = self.store.brpop(&self.full_keys(keys), timeout).await?;
        Ok(popped.map(|(key, value)| (self.strip(&key).to_string(), value)))
    }

    pub async fn llen(&self, key: &str) -> KvResult<u64> {
        self.store.llen(&self.full_key(key)).await
    }

    pub async fn lrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<Vec<u8>>> {
        self.store.lrange(&self.full_key(key), start, stop).await
    }

    // ==================== Iteration ====================

    /// One SCAN step over `<namespace>:<pattern>`. Returned keys are logical.
    pub async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> KvResult<(u64, Vec<String>)> {
        let (next, keys) = self
            .store
            .scan(cursor, &self.full_key(pattern), count)
            .await?;
        let keys = keys
            .iter()
            .map(|k| self.strip(k).to_string())
            .collect();
        Ok((next, keys))
    }

    // ==================== Atomic scripts ====================

    pub async fn token_bucket(
        &self,
        key: &str,
        params: &TokenBucketParams,
    ) -> KvResult<TokenBucketOutcome> {
        self.store.token_bucket(&self.full_key(key), params).await
    }

    pub async fn sliding_window(
        &self,
        key: &str,
        params: &SlidingWindowParams,
    ) -> KvResult<SlidingWindowOutcome> {
        self.store.sliding_window(&self.full_key(key), params).await
    }

    pub async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> KvResult<bool> {
        self.store
            .compare_and_delete(&self.full_key(key), expected)
            .await
    }

    pub async fn compare_and_expire(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> KvResult<bool> {
        self.store
            .compare_and_expire(&self.full_key(key), expected, ttl)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_joins_segments() {
        assert_eq!(KvClient::key(&["user", "42"]), "user:42");
        assert_eq!(KvClient::key(&["single"]), "single");
    }

    #[test]
    fn test_trailing_colon_in_namespace_is_trimmed() {
        let client = KvClient::memory("app:");
        assert_eq!(client.namespace(), "app");
        assert_eq!(client.full_key("user:1"), "app:user:1");
    }

    #[tokio::test]
    async fn test_keys_are_prefixed_in_store() {
        let client = KvClient::memory("app");
        client.set("user:1", b"alice", None).await.unwrap();

        assert_eq!(
            client.store().get("app:user:1").await.unwrap(),
            Some(b"alice".to_vec())
        );
        assert_eq!(client.store().get("user:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let a = KvClient::new(store.clone(), "a");
        let b = KvClient::new(store, "b");

        a.set("k", b"1", None).await.unwrap();
        assert_eq!(b.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_strips_prefix() {
        let client = KvClient::memory("app");
        client.set("user:1", b"x", None).await.unwrap();
        client.set("user:2", b"x", None).await.unwrap();
        client.set("order:1", b"x", None).await.unwrap();

        let (cursor, mut keys) = client.scan(0, "user:*", 100).await.unwrap();
        keys.sort();
        assert_eq!(cursor, 0);
        assert_eq!(keys, vec!["user:1", "user:2"]);
    }

    #[tokio::test]
    async fn test_brpop_returns_logical_key() {
        let client = KvClient::memory("app");
        client.lpush("jobs", b"j1").await.unwrap();
        let popped = client
            .brpop(&["jobs".to_string()], Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(popped, Some(("jobs".to_string(), b"j1".to_vec())));
    }

    #[tokio::test]
    async fn test_empty_key_lists_skip_round_trip() {
        let client = KvClient::memory("app");
        assert_eq!(client.del(&[]).await.unwrap(), 0);
        assert!(client.mget(&[]).await.unwrap().is_empty());
    }
}
