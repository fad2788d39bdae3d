//! In-process store used when Redis is disabled and in tests.
//!
//! All state lives behind one mutex, so each script operation is atomic
//! within this process. It provides no coordination across processes: a
//! deployment with more than one instance must use Redis.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::Notify;

use crate::clock::{SharedClock, system_clock};
use crate::error::{KvError, KvResult};
use crate::store::{
    KeyTtl, KvStore, SlidingWindowOutcome, SlidingWindowParams, TokenBucketOutcome,
    TokenBucketParams, ttl_millis,
};

const TOKENS_FIELD: &str = "tokens";
const LAST_REFILL_FIELD: &str = "last_refill";

enum Value {
    Str(Vec<u8>),
    Hash(HashMap<String, Vec<u8>>),
    ZSet(HashMap<String, f64>),
    List(VecDeque<Vec<u8>>),
}

impl Value {
    fn is_empty_aggregate(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::Hash(h) => h.is_empty(),
            Value::ZSet(z) => z.is_empty(),
            Value::List(l) => l.is_empty(),
        }
    }
}

struct Slot {
    value: Value,
    /// Unix millis after which the slot is gone.
    expires_at: Option<u64>,
    /// Creation order; SCAN cursors walk this so deletes do not shift them.
    seq: u64,
}

impl Slot {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    next_seq: u64,
}

impl Inner {
    fn insert(&mut self, key: &str, value: Value, expires_at: Option<u64>) {
        let seq = self.bump_seq();
        self.slots.insert(
            key.to_string(),
            Slot {
                value,
                expires_at,
                seq,
            },
        );
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn slot_or_create(&mut self, key: &str, now: u64, empty: fn() -> Value) -> &mut Slot {
        self.purge(key, now);
        let seq = self.bump_seq();
        self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: empty(),
            expires_at: None,
            seq,
        })
    }

    fn purge(&mut self, key: &str, now: u64) {
        if self.slots.get(key).is_some_and(|s| s.is_expired(now)) {
            self.slots.remove(key);
        }
    }

    fn purge_all(&mut self, now: u64) {
        self.slots.retain(|_, slot| !slot.is_expired(now));
    }

    fn live(&mut self, key: &str, now: u64) -> Option<&mut Slot> {
        self.purge(key, now);
        self.slots.get_mut(key)
    }

    /// Redis deletes hashes, sets and lists once they become empty.
    fn drop_if_empty(&mut self, key: &str) {
        if self
            .slots
            .get(key)
            .is_some_and(|s| s.value.is_empty_aggregate())
        {
            self.slots.remove(key);
        }
    }

    fn string(&mut self, key: &str, now: u64) -> KvResult<Option<&Vec<u8>>> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Slot {
                value: Value::Str(v),
                ..
            }) => Ok(Some(v)),
            Some(_) => Err(KvError::wrong_type(key)),
        }
    }

    fn hash(&mut self, key: &str, now: u64) -> KvResult<Option<&mut HashMap<String, Vec<u8>>>> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Slot {
                value: Value::Hash(h),
                ..
            }) => Ok(Some(h)),
            Some(_) => Err(KvError::wrong_type(key)),
        }
    }

    fn hash_or_create(&mut self, key: &str, now: u64) -> KvResult<&mut HashMap<String, Vec<u8>>> {
        let slot = self.slot_or_create(key, now, || Value::Hash(HashMap::new()));
        match &mut slot.value {
            Value::Hash(h) => Ok(h),
            _ => Err(KvError::wrong_type(key)),
        }
    }

    fn zset(&mut self, key: &str, now: u64) -> KvResult<Option<&mut HashMap<String, f64>>> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Slot {
                value: Value::ZSet(z),
                ..
            }) => Ok(Some(z)),
            Some(_) => Err(KvError::wrong_type(key)),
        }
    }

    fn zset_or_create(&mut self, key: &str, now: u64) -> KvResult<&mut HashMap<String, f64>> {
        let slot = self.slot_or_create(key, now, || Value::ZSet(HashMap::new()));
        match &mut slot.value {
            Value::ZSet(z) => Ok(z),
            _ => Err(KvError::wrong_type(key)),
        }
    }

    fn list(&mut self, key: &str, now: u64) -> KvResult<Option<&mut VecDeque<Vec<u8>>>> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Slot {
                value: Value::List(l),
                ..
            }) => Ok(Some(l)),
            Some(_) => Err(KvError::wrong_type(key)),
        }
    }

    fn list_or_create(&mut self, key: &str, now: u64) -> KvResult<&mut VecDeque<Vec<u8>>> {
        let slot = self.slot_or_create(key, now, || Value::List(VecDeque::new()));
        match &mut slot.value {
            Value::List(l) => Ok(l),
            _ => Err(KvError::wrong_type(key)),
        }
    }

    fn pop(&mut self, key: &str, now: u64, front: bool) -> KvResult<Option<Vec<u8>>> {
        let popped = match self.list(key, now)? {
            Some(list) if front => list.pop_front(),
            Some(list) => list.pop_back(),
            None => None,
        };
        self.drop_if_empty(key);
        Ok(popped)
    }

    fn set_expiry(&mut self, key: &str, now: u64, ttl: Duration) -> bool {
        match self.live(key, now) {
            Some(slot) => {
                slot.expires_at = Some(now + ttl_millis(ttl));
                true
            }
            None => false,
        }
    }
}

/// Members ordered by (score, member), as Redis orders sorted sets.
fn sorted_members(zset: &HashMap<String, f64>) -> Vec<(&String, f64)> {
    let mut members: Vec<(&String, f64)> = zset.iter().map(|(m, s)| (m, *s)).collect();
    members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    members
}

/// Resolves a Redis-style inclusive index range against a collection length.
fn rank_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { len + start } else { start }.max(0);
    let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Translates a Redis glob (`*`, `?`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> KvResult<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| KvError::command(format!("invalid pattern '{pattern}': {e}")))
}

fn parse_number<T: std::str::FromStr>(raw: Option<&Vec<u8>>) -> Option<T> {
    raw.and_then(|bytes| std::str::from_utf8(bytes).ok())
        .and_then(|s| s.parse::<T>().ok())
}

/// Single-process store with Redis semantics for the commands this crate uses.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: SharedClock,
    available: AtomicBool,
    pushed: Notify,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.inner.lock().slots.len())
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Uses `clock` for key expiry, so tests can step TTLs deterministically.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
            available: AtomicBool::new(true),
            pushed: Notify::new(),
        }
    }

    /// Simulates the store becoming unreachable (`false`) or recovering.
    /// While unavailable every command fails with `KvError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock();
        inner.purge_all(now);
        inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> KvResult<u64> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(KvError::unavailable("memory store offline"));
        }
        Ok(self.clock.now_millis())
    }

    fn try_rpop_any(&self, keys: &[String]) -> KvResult<Option<(String, Vec<u8>)>> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        for key in keys {
            if let Some(value) = inner.pop(key, now, false)? {
                return Ok(Some((key.clone(), value)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> KvResult<()> {
        self.check().map(|_| ())
    }

    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let now = self.check()?;
        Ok(self.inner.lock().string(key, now)?.cloned())
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> KvResult<()> {
        let now = self.check()?;
        self.inner.lock().insert(
            key,
            Value::Str(value.to_vec()),
            ttl.map(|t| now + ttl_millis(t)),
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> KvResult<bool> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        if inner.live(key, now).is_some() {
            return Ok(false);
        }
        inner.insert(
            key,
            Value::Str(value.to_vec()),
            Some(now + ttl_millis(ttl)),
        );
        Ok(true)
    }

    async fn set_many(
        &self,
        entries: &[(String, Vec<u8>)],
        ttl: Option<Duration>,
    ) -> KvResult<()> {
        let now = self.check()?;
        let expires_at = ttl.map(|t| now + ttl_millis(t));
        let mut inner = self.inner.lock();
        for (key, value) in entries {
            inner.insert(key, Value::Str(value.clone()), expires_at);
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> KvResult<u64> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        let mut removed = 0;
        for key in keys {
            inner.purge(key, now);
            if inner.slots.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        let now = self.check()?;
        Ok(self.inner.lock().live(key, now).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool> {
        let now = self.check()?;
        Ok(self.inner.lock().set_expiry(key, now, ttl))
    }

    async fn ttl(&self, key: &str) -> KvResult<KeyTtl> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        Ok(match inner.live(key, now) {
            None => KeyTtl::Missing,
            Some(Slot {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Slot {
                expires_at: Some(at),
                ..
            }) => KeyTtl::ExpiresIn(Duration::from_millis(at.saturating_sub(now))),
        })
    }

    async fn mget(&self, keys: &[String]) -> KvResult<Vec<Option<Vec<u8>>>> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        // MGET reports nil for keys holding a non-string value.
        Ok(keys
            .iter()
            .map(|key| inner.string(key, now).ok().flatten().cloned())
            .collect())
    }

    async fn hset(&self, key: &str, fields: &[(String, Vec<u8>)]) -> KvResult<u64> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        let hash = inner.hash_or_create(key, now)?;
        let mut created = 0;
        for (field, value) in fields {
            if hash.insert(field.clone(), value.clone()).is_none() {
                created += 1;
            }
        }
        inner.drop_if_empty(key);
        Ok(created)
    }

    async fn hget(&self, key: &str, field: &str) -> KvResult<Option<Vec<u8>>> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        Ok(inner.hash(key, now)?.and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, Vec<u8>>> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        Ok(inner.hash(key, now)?.map(|h| h.clone()).unwrap_or_default())
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> KvResult<u64> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        let removed = match inner.hash(key, now)? {
            Some(hash) => fields
                .iter()
                .filter(|field| hash.remove(field.as_str()).is_some())
                .count() as u64,
            None => 0,
        };
        inner.drop_if_empty(key);
        Ok(removed)
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> KvResult<Vec<Option<Vec<u8>>>> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        let hash = inner.hash(key, now)?;
        Ok(fields
            .iter()
            .map(|field| hash.as_ref().and_then(|h| h.get(field).cloned()))
            .collect())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> KvResult<bool> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        let zset = inner.zset_or_create(key, now)?;
        Ok(zset.insert(member.to_string(), score).is_none())
    }

    async fn zrem(&self, key: &str, member: &str) -> KvResult<bool> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        let removed = match inner.zset(key, now)? {
            Some(zset) => zset.remove(member).is_some(),
            None => false,
        };
        inner.drop_if_empty(key);
        Ok(removed)
    }

    async fn zscore(&self, key: &str, member: &str) -> KvResult<Option<f64>> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        Ok(inner.zset(key, now)?.and_then(|z| z.get(member).copied()))
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        let Some(zset) = inner.zset(key, now)? else {
            return Ok(Vec::new());
        };
        let members = sorted_members(zset);
        Ok(match rank_range(members.len(), start, stop) {
            Some((from, to)) => members[from..=to]
                .iter()
                .map(|(m, _)| (*m).clone())
                .collect(),
            None => Vec::new(),
        })
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> KvResult<u64> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        let removed = match inner.zset(key, now)? {
            Some(zset) => {
                let before = zset.len();
                zset.retain(|_, score| *score < min || *score > max);
                (before - zset.len()) as u64
            }
            None => 0,
        };
        inner.drop_if_empty(key);
        Ok(removed)
    }

    async fn zcard(&self, key: &str) -> KvResult<u64> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        Ok(inner.zset(key, now)?.map_or(0, |z| z.len() as u64))
    }

    async fn lpush(&self, key: &str, value: &[u8]) -> KvResult<u64> {
        let now = self.check()?;
        let len = {
            let mut inner = self.inner.lock();
            let list = inner.list_or_create(key, now)?;
            list.push_front(value.to_vec());
            list.len() as u64
        };
        self.pushed.notify_waiters();
        Ok(len)
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> KvResult<u64> {
        let now = self.check()?;
        let len = {
            let mut inner = self.inner.lock();
            let list = inner.list_or_create(key, now)?;
            list.push_back(value.to_vec());
            list.len() as u64
        };
        self.pushed.notify_waiters();
        Ok(len)
    }

    async fn lpop(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let now = self.check()?;
        self.inner.lock().pop(key, now, true)
    }

    async fn rpop(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let now = self.check()?;
        self.inner.lock().pop(key, now, false)
    }

    async fn brpop(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> KvResult<Option<(String, Vec<u8>)>> {
        let deadline = (!timeout.is_zero()).then(|| tokio::time::Instant::now() + timeout);
        loop {
            // Register interest before checking so a push in between is not missed.
            let notified = self.pushed.notified();
            if let Some(hit) = self.try_rpop_any(keys)? {
                return Ok(Some(hit));
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return self.try_rpop_any(keys);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn llen(&self, key: &str) -> KvResult<u64> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        Ok(inner.list(key, now)?.map_or(0, |l| l.len() as u64))
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<Vec<u8>>> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        let Some(list) = inner.list(key, now)? else {
            return Ok(Vec::new());
        };
        Ok(match rank_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> KvResult<(u64, Vec<String>)> {
        let now = self.check()?;
        let matcher = glob_to_regex(pattern)?;
        let mut inner = self.inner.lock();
        inner.purge_all(now);

        // Cursor is the lowest creation sequence still to visit.
        let mut pending: Vec<(u64, &String)> = inner
            .slots
            .iter()
            .filter(|(_, slot)| slot.seq >= cursor)
            .map(|(key, slot)| (slot.seq, key))
            .collect();
        pending.sort_unstable_by_key(|(seq, _)| *seq);

        let step = count.max(1);
        let next = match pending.get(step) {
            Some((seq, _)) => *seq,
            None => 0,
        };
        let matched = pending
            .iter()
            .take(step)
            .filter(|(_, key)| matcher.is_match(key))
            .map(|(_, key)| (*key).clone())
            .collect();
        Ok((next, matched))
    }

    async fn token_bucket(
        &self,
        key: &str,
        params: &TokenBucketParams,
    ) -> KvResult<TokenBucketOutcome> {
        let now = self.check()?;
        let mut inner = self.inner.lock();

        let (stored_tokens, stored_refill) = match inner.hash(key, now)? {
            Some(hash) => (
                parse_number::<f64>(hash.get(TOKENS_FIELD)),
                parse_number::<f64>(hash.get(LAST_REFILL_FIELD)),
            ),
            None => (None, None),
        };
        let (tokens, last_refill) = match (stored_tokens, stored_refill) {
            (Some(tokens), Some(last)) => (tokens, last),
            _ => (params.capacity, params.now_secs as f64),
        };

        let elapsed = (params.now_secs as f64 - last_refill).max(0.0);
        let mut tokens = (tokens + elapsed * params.refill_per_sec).min(params.capacity);

        let allowed = tokens >= params.cost;
        if allowed {
            tokens -= params.cost;
            let hash = inner.hash_or_create(key, now)?;
            hash.insert(TOKENS_FIELD.to_string(), tokens.to_string().into_bytes());
            hash.insert(
                LAST_REFILL_FIELD.to_string(),
                params.now_secs.to_string().into_bytes(),
            );
            inner.set_expiry(key, now, params.ttl);
        }

        Ok(TokenBucketOutcome { allowed, tokens })
    }

    async fn sliding_window(
        &self,
        key: &str,
        params: &SlidingWindowParams,
    ) -> KvResult<SlidingWindowOutcome> {
        let now = self.check()?;
        let mut inner = self.inner.lock();

        let window_start = params.now_millis as f64 - ttl_millis(params.window) as f64;
        let zset = inner.zset_or_create(key, now)?;
        zset.retain(|_, score| *score >= window_start);

        let mut count = zset.len() as u64;
        let allowed = count < params.limit;
        if allowed {
            zset.insert(params.member.clone(), params.now_millis as f64);
            count += 1;
        }

        inner.drop_if_empty(key);
        inner.set_expiry(key, now, params.ttl);
        Ok(SlidingWindowOutcome { allowed, count })
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> KvResult<bool> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        let owned = matches!(inner.string(key, now), Ok(Some(v)) if v.as_slice() == expected);
        if owned {
            inner.slots.remove(key);
        }
        Ok(owned)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> KvResult<bool> {
        let now = self.check()?;
        let mut inner = self.inner.lock();
        let owned = matches!(inner.string(key, now), Ok(Some(v)) if v.as_slice() == expected);
        Ok(owned && inner.set_expiry(key, now, ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn store_at(start_ms: u64) -> (MemoryStore, Arc<ManualClock>) {
        let clock = ManualClock::new(start_ms);
        (MemoryStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_get_with_expiry() {
        let (store, clock) = store_at(0);
        store
            .set("k", b"v", Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(matches!(
            store.ttl("k").await.unwrap(),
            KeyTtl::ExpiresIn(d) if d == Duration::from_millis(100)
        ));

        clock.advance(Duration::from_millis(100));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_set_nx_respects_existing_key() {
        let (store, clock) = store_at(0);
        assert!(store.set_nx("lock", b"a", Duration::from_secs(1)).await.unwrap());
        assert!(!store.set_nx("lock", b"b", Duration::from_secs(1)).await.unwrap());
        clock.advance(Duration::from_secs(1));
        assert!(store.set_nx("lock", b"b", Duration::from_secs(1)).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn test_wrong_type_is_reported() {
        let store = MemoryStore::new();
        store.rpush("list", b"x").await.unwrap();
        let err = store.get("list").await.unwrap_err();
        assert!(matches!(err, KvError::WrongType { .. }));
        // MGET tolerates non-string keys.
        assert_eq!(store.mget(&["list".to_string()]).await.unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_hash_ops_and_empty_cleanup() {
        let store = MemoryStore::new();
        let created = store
            .hset(
                "h",
                &[("a".into(), b"1".to_vec()), ("b".into(), b"2".to_vec())],
            )
            .await
            .unwrap();
        assert_eq!(created, 2);
        assert_eq!(store.hget("h", "a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(
            store
                .hmget("h", &["b".into(), "zz".into()])
                .await
                .unwrap(),
            vec![Some(b"2".to_vec()), None]
        );
        assert_eq!(store.hgetall("h").await.unwrap().len(), 2);
        assert_eq!(store.hdel("h", &["a".into(), "b".into()]).await.unwrap(), 2);
        assert!(!store.exists("h").await.unwrap());
    }

    #[tokio::test]
    async fn test_sorted_set_ordering_and_range_removal() {
        let store = MemoryStore::new();
        store.zadd("z", 3.0, "c").await.unwrap();
        store.zadd("z", 1.0, "a").await.unwrap();
        store.zadd("z", 2.0, "b").await.unwrap();
        assert_eq!(store.zrange("z", 0, -1).await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(store.zrange("z", -2, -1).await.unwrap(), vec!["b", "c"]);
        assert_eq!(store.zscore("z", "b").await.unwrap(), Some(2.0));
        assert_eq!(
            store
                .zremrangebyscore("z", f64::NEG_INFINITY, 2.0)
                .await
                .unwrap(),
            2
        );
        assert_eq!(store.zcard("z").await.unwrap(), 1);
        assert!(store.zrem("z", "c").await.unwrap());
        assert!(!store.exists("z").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_ops() {
        let store = MemoryStore::new();
        store.rpush("q", b"1").await.unwrap();
        store.rpush("q", b"2").await.unwrap();
        store.lpush("q", b"0").await.unwrap();
        assert_eq!(store.llen("q").await.unwrap(), 3);
        assert_eq!(
            store.lrange("q", 0, -1).await.unwrap(),
            vec![b"0".to_vec(), b"1".to_vec(), b"2".to_vec()]
        );
        assert_eq!(store.lpop("q").await.unwrap(), Some(b"0".to_vec()));
        assert_eq!(store.rpop("q").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_brpop_wakes_on_push() {
        let store = Arc::new(MemoryStore::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .brpop(&["jobs".to_string()], Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.lpush("jobs", b"job-1").await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped, Some(("jobs".to_string(), b"job-1".to_vec())));
    }

    #[tokio::test]
    async fn test_brpop_times_out() {
        let store = MemoryStore::new();
        let popped = store
            .brpop(&["empty".to_string()], Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn test_scan_walks_every_matching_key() {
        let store = MemoryStore::new();
        for i in 0..250 {
            store
                .set(&format!("app:user:{i}"), b"x", None)
                .await
                .unwrap();
        }
        store.set("app:order:1", b"x", None).await.unwrap();

        let mut cursor = 0;
        let mut found = Vec::new();
        loop {
            let (next, keys) = store.scan(cursor, "app:user:*", 100).await.unwrap();
            found.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(found.len(), 250);
        assert!(found.iter().all(|k| k.starts_with("app:user:")));
    }

    #[tokio::test]
    async fn test_compare_and_delete_requires_token() {
        let store = MemoryStore::new();
        store.set_nx("lock", b"owner", Duration::from_secs(5)).await.unwrap();
        assert!(!store.compare_and_delete("lock", b"intruder").await.unwrap());
        assert!(store.exists("lock").await.unwrap());
        assert!(store.compare_and_delete("lock", b"owner").await.unwrap());
        assert!(!store.exists("lock").await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_command() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(store.get("k").await.unwrap_err().is_transport());
        assert!(store.ping().await.unwrap_err().is_transport());
        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_scan_survives_deletes_between_steps() {
        let store = MemoryStore::new();
        for i in 0..30 {
            store.set(&format!("k:{i}"), b"x", None).await.unwrap();
        }

        let mut cursor = 0;
        let mut seen = 0;
        loop {
            let (next, keys) = store.scan(cursor, "k:*", 10).await.unwrap();
            seen += keys.len();
            store.del(&keys).await.unwrap();
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen, 30);
        assert!(store.is_empty());
    }

    #[test]
    fn test_rank_range() {
        assert_eq!(rank_range(5, 0, -1), Some((0, 4)));
        assert_eq!(rank_range(5, -2, 10), Some((3, 4)));
        assert_eq!(rank_range(5, 4, 2), None);
        assert_eq!(rank_range(0, 0, -1), None);
    }

    #[test]
    fn test_glob_translation_escapes_literals() {
        let re = glob_to_regex("app:user.?:*").unwrap();
        assert!(re.is_match("app:user.1:abc"));
        assert!(!re.is_match("app:userX1:abc"));
    }
}
