//! The store trait every backend implements.
//!
//! Keys at this level are raw: namespacing is applied by
//! [`KvClient`](crate::KvClient). The four script operations at the bottom of
//! the trait are the only multi-step mutations; backends must evaluate each of
//! them atomically with respect to every other client of the same store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::KvResult;

/// Remaining lifetime of a key, as reported by TTL/PTTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// The key expires after the given duration.
    ExpiresIn(Duration),
}

/// Inputs to the token bucket refill-then-consume script.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucketParams {
    /// Maximum number of tokens the bucket holds.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_per_sec: f64,
    /// Caller's notion of "now", whole Unix seconds.
    pub now_secs: u64,
    /// Tokens to consume on admission.
    pub cost: f64,
    /// Expiry applied to the bucket state after an admission.
    pub ttl: Duration,
}

/// Result of one token bucket evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucketOutcome {
    pub allowed: bool,
    /// Tokens left after the evaluation (after refill, after consumption).
    pub tokens: f64,
}

/// Inputs to the sliding window prune-then-admit script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlidingWindowParams {
    /// Caller's notion of "now", Unix milliseconds. Used as the event score.
    pub now_millis: u64,
    /// Width of the rolling window.
    pub window: Duration,
    /// Maximum events admitted within one window.
    pub limit: u64,
    /// Unique member recorded for this event.
    pub member: String,
    /// Expiry refreshed on every evaluation.
    pub ttl: Duration,
}

/// Result of one sliding window evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindowOutcome {
    pub allowed: bool,
    /// Events in the window after the evaluation.
    pub count: u64,
}

/// Contract for a Redis-compatible key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Short backend name for logs and health output ("redis", "memory").
    fn backend(&self) -> &'static str;

    /// Round-trips to the store.
    async fn ping(&self) -> KvResult<()>;

    // ==================== Strings ====================

    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    /// SET with an optional expiry (millisecond precision).
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> KvResult<()>;

    /// SET NX PX. Returns `true` if the key was written.
    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> KvResult<bool>;

    /// Writes several keys with one expiry in a single round-trip.
    async fn set_many(&self, entries: &[(String, Vec<u8>)], ttl: Option<Duration>)
    -> KvResult<()>;

    /// Deletes keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> KvResult<u64>;

    async fn exists(&self, key: &str) -> KvResult<bool>;

    /// Sets an expiry. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool>;

    async fn ttl(&self, key: &str) -> KvResult<KeyTtl>;

    async fn mget(&self, keys: &[String]) -> KvResult<Vec<Option<Vec<u8>>>>;

    // ==================== Hashes ====================

    /// Returns the number of fields that were newly created.
    async fn hset(&self, key: &str, fields: &[(String, Vec<u8>)]) -> KvResult<u64>;

    async fn hget(&self, key: &str, field: &str) -> KvResult<Option<Vec<u8>>>;

    async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, Vec<u8>>>;

    async fn hdel(&self, key: &str, fields: &[String]) -> KvResult<u64>;

    async fn hmget(&self, key: &str, fields: &[String]) -> KvResult<Vec<Option<Vec<u8>>>>;

    // ==================== Sorted sets ====================

    /// Returns `true` if the member was newly added.
    async fn zadd(&self, key: &str, score: f64, member: &str) -> KvResult<bool>;

    async fn zrem(&self, key: &str, member: &str) -> KvResult<bool>;

    async fn zscore(&self, key: &str, member: &str) -> KvResult<Option<f64>>;

    /// Members by ascending score, inclusive rank range, negative indices
    /// count from the end.
    async fn zrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>>;

    /// Removes members with `min <= score <= max`.
    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> KvResult<u64>;

    async fn zcard(&self, key: &str) -> KvResult<u64>;

    // ==================== Lists ====================

    /// Returns the list length after the push.
    async fn lpush(&self, key: &str, value: &[u8]) -> KvResult<u64>;

    async fn rpush(&self, key: &str, value: &[u8]) -> KvResult<u64>;

    async fn lpop(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    async fn rpop(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    /// Blocking RPOP across several keys. A zero timeout blocks indefinitely.
    /// Returns the key that yielded a value along with the value.
    async fn brpop(&self, keys: &[String], timeout: Duration)
    -> KvResult<Option<(String, Vec<u8>)>>;

    async fn llen(&self, key: &str) -> KvResult<u64>;

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<Vec<u8>>>;

    // ==================== Iteration ====================

    /// One SCAN step. Returns the next cursor (0 when iteration is complete)
    /// and the keys matching `pattern` seen in this step.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> KvResult<(u64, Vec<String>)>;

    // ==================== Atomic scripts ====================

    /// Refill-then-consume on the bucket stored at `key`.
    async fn token_bucket(
        &self,
        key: &str,
        params: &TokenBucketParams,
    ) -> KvResult<TokenBucketOutcome>;

    /// Prune-then-admit on the event set stored at `key`.
    async fn sliding_window(
        &self,
        key: &str,
        params: &SlidingWindowParams,
    ) -> KvResult<SlidingWindowOutcome>;

    /// Deletes `key` only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> KvResult<bool>;

    /// Resets the expiry of `key` only if it currently holds `expected`.
    async fn compare_and_expire(&self, key: &str, expected: &[u8], ttl: Duration)
    -> KvResult<bool>;
}

/// Converts a duration to whole milliseconds for PX/PEXPIRE, never zero.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2_000);
    }
}
