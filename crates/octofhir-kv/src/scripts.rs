//! Lua sources for the atomic store-side operations.
//!
//! Each script runs to completion inside Redis' single command loop, which is
//! what makes the limiters correct across processes. The memory backend
//! mirrors these semantics in `memory.rs`; keep the two in sync.

/// KEYS[1] = bucket hash
/// ARGV = capacity, refill_per_sec, now_secs, cost, ttl_ms
///
/// Returns `{allowed (0|1), tokens (string)}`. A rejection leaves the stored
/// state untouched: recomputing the refill later from the old timestamp gives
/// the same result because a rejected bucket is below capacity.
pub const TOKEN_BUCKET: &str = r#"
local capacity = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local cost = tonumber(ARGV[4])
local ttl_ms = tonumber(ARGV[5])

local state = redis.call('HMGET', KEYS[1], 'tokens', 'last_refill')
local tokens = tonumber(state[1])
local last_refill = tonumber(state[2])
if tokens == nil or last_refill == nil then
  tokens = capacity
  last_refill = now
end

local elapsed = math.max(0, now - last_refill)
tokens = math.min(capacity, tokens + elapsed * rate)

local allowed = 0
if tokens >= cost then
  tokens = tokens - cost
  allowed = 1
  redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'last_refill', tostring(now))
  redis.call('PEXPIRE', KEYS[1], ttl_ms)
end

return {allowed, tostring(tokens)}
"#;

/// KEYS[1] = event sorted set
/// ARGV = now_ms, window_ms, limit, member, ttl_ms
///
/// Returns `{allowed (0|1), count}`.
pub const SLIDING_WINDOW: &str = r#"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', '(' .. (now - window))
local count = redis.call('ZCARD', KEYS[1])

local allowed = 0
if count < limit then
  redis.call('ZADD', KEYS[1], now, ARGV[4])
  count = count + 1
  allowed = 1
end

redis.call('PEXPIRE', KEYS[1], ARGV[5])
return {allowed, count}
"#;

/// KEYS[1] = lock key, ARGV[1] = expected token
pub const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// KEYS[1] = lock key, ARGV[1] = expected token, ARGV[2] = ttl_ms
pub const COMPARE_AND_EXPIRE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;
