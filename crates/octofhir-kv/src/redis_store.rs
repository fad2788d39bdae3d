//! Redis backend over a `deadpool-redis` connection pool.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::{RedisResult, Script};

use crate::error::{KvError, KvResult};
use crate::scripts;
use crate::store::{
    KeyTtl, KvStore, SlidingWindowOutcome, SlidingWindowParams, TokenBucketOutcome,
    TokenBucketParams, ttl_millis,
};

/// Compiled scripts. `Script` hashes its source once and invokes by EVALSHA,
/// falling back to EVAL (which loads it) on NOSCRIPT.
struct Scripts {
    token_bucket: Script,
    sliding_window: Script,
    compare_and_delete: Script,
    compare_and_expire: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            token_bucket: Script::new(scripts::TOKEN_BUCKET),
            sliding_window: Script::new(scripts::SLIDING_WINDOW),
            compare_and_delete: Script::new(scripts::COMPARE_AND_DELETE),
            compare_and_expire: Script::new(scripts::COMPARE_AND_EXPIRE),
        }
    }
}

/// Redis-backed store shared by every instance of the service.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    command_timeout: Duration,
    scripts: Arc<Scripts>,
}

impl RedisStore {
    pub fn new(pool: Pool, command_timeout: Duration) -> Self {
        Self {
            pool,
            command_timeout,
            scripts: Arc::new(Scripts::load()),
        }
    }

    /// The underlying pool (for health checks and pool statistics).
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> KvResult<Connection> {
        Ok(self.pool.get().await?)
    }

    /// Bounds a command future by the configured deadline.
    async fn timed<T>(
        &self,
        command: &str,
        fut: impl Future<Output = RedisResult<T>>,
    ) -> KvResult<T> {
        self.timed_with(command, self.command_timeout, fut).await
    }

    async fn timed_with<T>(
        &self,
        command: &str,
        deadline: Duration,
        fut: impl Future<Output = RedisResult<T>>,
    ) -> KvResult<T> {
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result.map_err(|e| {
                tracing::debug!(command, error = %e, "Redis command failed");
                KvError::from(e)
            }),
            Err(_) => {
                tracing::warn!(command, timeout_ms = deadline.as_millis() as u64, "Redis command timed out");
                Err(KvError::timeout(command, deadline))
            }
        }
    }
}

/// Formats a score bound the way ZRANGEBYSCORE/ZREMRANGEBYSCORE expect.
fn score_arg(score: f64) -> String {
    if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if score == f64::INFINITY {
        "+inf".to_string()
    } else {
        score.to_string()
    }
}

#[async_trait]
impl KvStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> KvResult<()> {
        let mut conn = self.conn().await?;
        let _: String = self
            .timed("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        self.timed("GET", redis::cmd("GET").arg(key).query_async(&mut conn))
            .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> KvResult<()> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = self.timed("SET", cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> KvResult<bool> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = self
            .timed(
                "SET NX",
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_millis(ttl))
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn set_many(
        &self,
        entries: &[(String, Vec<u8>)],
        ttl: Option<Duration>,
    ) -> KvResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SET").arg(key).arg(value.as_slice());
            if let Some(ttl) = ttl {
                pipe.arg("PX").arg(ttl_millis(ttl));
            }
            pipe.ignore();
        }
        let _: () = self.timed("PIPELINE SET", pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> KvResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        self.timed("DEL", redis::cmd("DEL").arg(keys).query_async(&mut conn))
            .await
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        let mut conn = self.conn().await?;
        self.timed("EXISTS", redis::cmd("EXISTS").arg(key).query_async(&mut conn))
            .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool> {
        let mut conn = self.conn().await?;
        self.timed(
            "PEXPIRE",
            redis::cmd("PEXPIRE")
                .arg(key)
                .arg(ttl_millis(ttl))
                .query_async(&mut conn),
        )
        .await
    }

    async fn ttl(&self, key: &str) -> KvResult<KeyTtl> {
        let mut conn = self.conn().await?;
        let pttl: i64 = self
            .timed("PTTL", redis::cmd("PTTL").arg(key).query_async(&mut conn))
            .await?;
        Ok(match pttl {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            ms => KeyTtl::ExpiresIn(Duration::from_millis(ms.max(0) as u64)),
        })
    }

    async fn mget(&self, keys: &[String]) -> KvResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        self.timed("MGET", redis::cmd("MGET").arg(keys).query_async(&mut conn))
            .await
    }

    async fn hset(&self, key: &str, fields: &[(String, Vec<u8>)]) -> KvResult<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value.as_slice());
        }
        self.timed("HSET", cmd.query_async(&mut conn)).await
    }

    async fn hget(&self, key: &str, field: &str) -> KvResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        self.timed(
            "HGET",
            redis::cmd("HGET").arg(key).arg(field).query_async(&mut conn),
        )
        .await
    }

    async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, Vec<u8>>> {
        let mut conn = self.conn().await?;
        self.timed("HGETALL", redis::cmd("HGETALL").arg(key).query_async(&mut conn))
            .await
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> KvResult<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        self.timed(
            "HDEL",
            redis::cmd("HDEL").arg(key).arg(fields).query_async(&mut conn),
        )
        .await
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> KvResult<Vec<Option<Vec<u8>>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        self.timed(
            "HMGET",
            redis::cmd("HMGET").arg(key).arg(fields).query_async(&mut conn),
        )
        .await
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> KvResult<bool> {
        let mut conn = self.conn().await?;
        let added: u64 = self
            .timed(
                "ZADD",
                redis::cmd("ZADD")
                    .arg(key)
                    .arg(score_arg(score))
                    .arg(member)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(added > 0)
    }

    async fn zrem(&self, key: &str, member: &str) -> KvResult<bool> {
        let mut conn = self.conn().await?;
        let removed: u64 = self
            .timed(
                "ZREM",
                redis::cmd("ZREM").arg(key).arg(member).query_async(&mut conn),
            )
            .await?;
        Ok(removed > 0)
    }

    async fn zscore(&self, key: &str, member: &str) -> KvResult<Option<f64>> {
        let mut conn = self.conn().await?;
        self.timed(
            "ZSCORE",
            redis::cmd("ZSCORE").arg(key).arg(member).query_async(&mut conn),
        )
        .await
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>> {
        let mut conn = self.conn().await?;
        self.timed(
            "ZRANGE",
            redis::cmd("ZRANGE")
                .arg(key)
                .arg(start)
                .arg(stop)
                .query_async(&mut conn),
        )
        .await
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> KvResult<u64> {
        let mut conn = self.conn().await?;
        self.timed(
            "ZREMRANGEBYSCORE",
            redis::cmd("ZREMRANGEBYSCORE")
                .arg(key)
                .arg(score_arg(min))
                .arg(score_arg(max))
                .query_async(&mut conn),
        )
        .await
    }

    async fn zcard(&self, key: &str) -> KvResult<u64> {
        let mut conn = self.conn().await?;
        self.timed("ZCARD", redis::cmd("ZCARD").arg(key).query_async(&mut conn))
            .await
    }

    async fn lpush(&self, key: &str, value: &[u8]) -> KvResult<u64> {
        let mut conn = self.conn().await?;
        self.timed(
            "LPUSH",
            redis::cmd("LPUSH").arg(key).arg(value).query_async(&mut conn),
        )
        .await
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> KvResult<u64> {
        let mut conn = self.conn().await?;
        self.timed(
            "RPUSH",
            redis::cmd("RPUSH").arg(key).arg(value).query_async(&mut conn),
        )
        .await
    }

    async fn lpop(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        self.timed("LPOP", redis::cmd("LPOP").arg(key).query_async(&mut conn))
            .await
    }

    async fn rpop(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        self.timed("RPOP", redis::cmd("RPOP").arg(key).query_async(&mut conn))
            .await
    }

    async fn brpop(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> KvResult<Option<(String, Vec<u8>)>> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("BRPOP");
        cmd.arg(keys).arg(timeout.as_secs_f64());
        if timeout.is_zero() {
            // Blocks until a value arrives; only the caller can cancel it.
            return cmd.query_async(&mut conn).await.map_err(KvError::from);
        }
        self.timed_with("BRPOP", timeout + self.command_timeout, cmd.query_async(&mut conn))
            .await
    }

    async fn llen(&self, key: &str) -> KvResult<u64> {
        let mut conn = self.conn().await?;
        self.timed("LLEN", redis::cmd("LLEN").arg(key).query_async(&mut conn))
            .await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<Vec<u8>>> {
        let mut conn = self.conn().await?;
        self.timed(
            "LRANGE",
            redis::cmd("LRANGE")
                .arg(key)
                .arg(start)
                .arg(stop)
                .query_async(&mut conn),
        )
        .await
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> KvResult<(u64, Vec<String>)> {
        let mut conn = self.conn().await?;
        self.timed(
            "SCAN",
            redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn),
        )
        .await
    }

    async fn token_bucket(
        &self,
        key: &str,
        params: &TokenBucketParams,
    ) -> KvResult<TokenBucketOutcome> {
        let mut conn = self.conn().await?;
        let (allowed, tokens): (i64, String) = self
            .timed(
                "EVALSHA token_bucket",
                self.scripts
                    .token_bucket
                    .key(key)
                    .arg(params.capacity)
                    .arg(params.refill_per_sec)
                    .arg(params.now_secs)
                    .arg(params.cost)
                    .arg(ttl_millis(params.ttl))
                    .invoke_async(&mut conn),
            )
            .await?;
        let tokens = tokens
            .parse::<f64>()
            .map_err(|e| KvError::decode(format!("token bucket returned '{tokens}': {e}")))?;
        Ok(TokenBucketOutcome {
            allowed: allowed == 1,
            tokens,
        })
    }

    async fn sliding_window(
        &self,
        key: &str,
        params: &SlidingWindowParams,
    ) -> KvResult<SlidingWindowOutcome> {
        let mut conn = self.conn().await?;
        let (allowed, count): (i64, u64) = self
            .timed(
                "EVALSHA sliding_window",
                self.scripts
                    .sliding_window
                    .key(key)
                    .arg(params.now_millis)
                    .arg(ttl_millis(params.window))
                    .arg(params.limit)
                    .arg(&params.member)
                    .arg(ttl_millis(params.ttl))
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(SlidingWindowOutcome {
            allowed: allowed == 1,
            count,
        })
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> KvResult<bool> {
        let mut conn = self.conn().await?;
        let deleted: i64 = self
            .timed(
                "EVALSHA compare_and_delete",
                self.scripts
                    .compare_and_delete
                    .key(key)
                    .arg(expected)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(deleted == 1)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> KvResult<bool> {
        let mut conn = self.conn().await?;
        let updated: i64 = self
            .timed(
                "EVALSHA compare_and_expire",
                self.scripts
                    .compare_and_expire
                    .key(key)
                    .arg(expected)
                    .arg(ttl_millis(ttl))
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(updated == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_arg_infinities() {
        assert_eq!(score_arg(f64::NEG_INFINITY), "-inf");
        assert_eq!(score_arg(f64::INFINITY), "+inf");
        assert_eq!(score_arg(1500.0), "1500");
    }
}
