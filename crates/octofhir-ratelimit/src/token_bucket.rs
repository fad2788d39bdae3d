//! Token bucket limiter.
//!
//! State per key is a hash `{tokens, last_refill}` with `last_refill` in whole
//! Unix seconds. Refill and consumption happen in one store-side script, so
//! the bucket stays within `[0, capacity]` under any concurrency. A rejected
//! request does not touch the stored state.

use std::time::Duration;

use async_trait::async_trait;

use octofhir_kv::{KvClient, SharedClock, TokenBucketOutcome, TokenBucketParams, system_clock};

use crate::error::{RateLimitError, RateLimitResult};
use crate::limiter::{Algorithm, RateLimitDecision, RateLimiter};
use crate::metrics;

const TOKENS_FIELD: &str = "tokens";
const LAST_REFILL_FIELD: &str = "last_refill";

/// Expiry added on top of the full-refill time.
const STATE_TTL_MARGIN: Duration = Duration::from_secs(1);

/// Longest time an empty bucket may take to refill (30 days). Bounds the
/// state TTL and every retry-after the bucket reports.
pub const MAX_REFILL_PERIOD: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Checks bucket parameters shared by [`TokenBucketLimiter::new`] and
/// [`RateLimitConfig::validate`](crate::RateLimitConfig::validate).
pub(crate) fn check_parameters(capacity: u64, refill_per_sec: f64) -> Result<(), String> {
    if capacity == 0 {
        return Err("capacity must be > 0".into());
    }
    if !refill_per_sec.is_finite() || refill_per_sec <= 0.0 {
        return Err("refill_per_sec must be a positive number".into());
    }
    if capacity as f64 / refill_per_sec > MAX_REFILL_PERIOD.as_secs_f64() {
        return Err(format!(
            "refill_per_sec {refill_per_sec} is too slow: a full refill of {capacity} tokens \
             must take at most {}s",
            MAX_REFILL_PERIOD.as_secs()
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct TokenBucketLimiter {
    client: KvClient,
    capacity: u64,
    refill_per_sec: f64,
    clock: SharedClock,
}

impl TokenBucketLimiter {
    pub fn new(client: KvClient, capacity: u64, refill_per_sec: f64) -> RateLimitResult<Self> {
        check_parameters(capacity, refill_per_sec)
            .map_err(|e| RateLimitError::config(format!("token bucket {e}")))?;
        Ok(Self {
            client,
            capacity,
            refill_per_sec,
            clock: system_clock(),
        })
    }

    /// Replaces the time source used for refill computations.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn refill_per_sec(&self) -> f64 {
        self.refill_per_sec
    }

    /// Time for an empty bucket to refill, plus a margin. An idle key expires
    /// only once it would be full again anyway.
    pub fn state_ttl(&self) -> Duration {
        let refill_secs = (self.capacity as f64 / self.refill_per_sec).ceil() as u64;
        Duration::from_secs(refill_secs)
            .min(MAX_REFILL_PERIOD)
            .saturating_add(STATE_TTL_MARGIN)
    }

    /// Consumes one token.
    pub async fn allow(&self, key: &str) -> RateLimitResult<TokenBucketOutcome> {
        self.allow_n(key, 1).await
    }

    /// Consumes `n` tokens if available. `n` must be in `1..=capacity`.
    pub async fn allow_n(&self, key: &str, n: u64) -> RateLimitResult<TokenBucketOutcome> {
        if n == 0 || n > self.capacity {
            return Err(RateLimitError::invalid_cost(n, self.capacity));
        }

        let params = TokenBucketParams {
            capacity: self.capacity as f64,
            refill_per_sec: self.refill_per_sec,
            now_secs: self.clock.now_secs(),
            cost: n as f64,
            ttl: self.state_ttl(),
        };
        let outcome = self.client.token_bucket(key, &params).await.map_err(|e| {
            metrics::record_store_error(Algorithm::TokenBucket);
            RateLimitError::from(e)
        })?;

        metrics::record_decision(Algorithm::TokenBucket, outcome.allowed);
        tracing::debug!(
            key = %key,
            cost = n,
            allowed = outcome.allowed,
            tokens = outcome.tokens,
            "Token bucket evaluated"
        );
        Ok(outcome)
    }

    /// Tokens available now, computed from the stored state without
    /// modifying it.
    pub async fn get_remaining(&self, key: &str) -> RateLimitResult<f64> {
        let fields = [TOKENS_FIELD.to_string(), LAST_REFILL_FIELD.to_string()];
        let values = self.client.hmget(key, &fields).await?;

        let tokens = values.first().and_then(|v| parse_f64(v.as_deref()));
        let last_refill = values.get(1).and_then(|v| parse_f64(v.as_deref()));
        let (Some(tokens), Some(last_refill)) = (tokens, last_refill) else {
            return Ok(self.capacity as f64);
        };

        let elapsed = (self.clock.now_secs() as f64 - last_refill).max(0.0);
        Ok((tokens + elapsed * self.refill_per_sec).min(self.capacity as f64))
    }

    /// Deletes the bucket; the next request starts from a full bucket.
    pub async fn reset(&self, key: &str) -> RateLimitResult<()> {
        self.client.del(&[key.to_string()]).await?;
        Ok(())
    }

    /// How long until `cost` tokens are available, given `tokens` now.
    fn wait_for(&self, tokens: f64, cost: u64) -> Duration {
        let deficit = (cost as f64 - tokens).max(0.0);
        Duration::try_from_secs_f64(deficit / self.refill_per_sec)
            .map_or(MAX_REFILL_PERIOD, |wait| wait.min(MAX_REFILL_PERIOD))
    }
}

fn parse_f64(raw: Option<&[u8]>) -> Option<f64> {
    raw.and_then(|bytes| std::str::from_utf8(bytes).ok())
        .and_then(|s| s.parse().ok())
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    fn algorithm(&self) -> Algorithm {
        Algorithm::TokenBucket
    }

    fn limit(&self) -> u64 {
        self.capacity
    }

    async fn check(&self, key: &str, cost: u64) -> RateLimitResult<RateLimitDecision> {
        let outcome = self.allow_n(key, cost).await?;
        Ok(RateLimitDecision {
            allowed: outcome.allowed,
            limit: self.capacity,
            remaining: outcome.tokens.max(0.0).floor() as u64,
            retry_after: (!outcome.allowed).then(|| self.wait_for(outcome.tokens, cost)),
        })
    }

    async fn remaining(&self, key: &str) -> RateLimitResult<u64> {
        Ok(self.get_remaining(key).await?.max(0.0).floor() as u64)
    }

    async fn reset(&self, key: &str) -> RateLimitResult<()> {
        TokenBucketLimiter::reset(self, key).await
    }
}
