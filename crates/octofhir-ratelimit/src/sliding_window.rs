//! Sliding window limiter.
//!
//! Each admitted event is a sorted-set member scored by its millisecond
//! timestamp. Events older than `now - window` are pruned before counting, so
//! the set never holds more than `limit` live events. Members carry a UUID
//! suffix; several admissions in the same millisecond are all counted.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use octofhir_kv::{KvClient, SharedClock, SlidingWindowOutcome, SlidingWindowParams, system_clock};

use crate::error::{RateLimitError, RateLimitResult};
use crate::limiter::{Algorithm, RateLimitDecision, RateLimiter};
use crate::metrics;

/// Expiry added on top of the window width.
const STATE_TTL_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    client: KvClient,
    limit: u64,
    window: Duration,
    clock: SharedClock,
}

impl SlidingWindowLimiter {
    pub fn new(client: KvClient, limit: u64, window: Duration) -> RateLimitResult<Self> {
        if limit == 0 {
            return Err(RateLimitError::config("sliding window limit must be > 0"));
        }
        if window.as_millis() == 0 {
            return Err(RateLimitError::config("sliding window must be at least 1ms"));
        }
        Ok(Self {
            client,
            limit,
            window,
            clock: system_clock(),
        })
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn window_millis(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }

    /// Records one event if fewer than `limit` events fall in the window.
    pub async fn allow(&self, key: &str) -> RateLimitResult<SlidingWindowOutcome> {
        let now_millis = self.clock.now_millis();
        let params = SlidingWindowParams {
            now_millis,
            window: self.window,
            limit: self.limit,
            member: format!("{now_millis}-{}", Uuid::new_v4()),
            ttl: self.window + STATE_TTL_MARGIN,
        };
        let outcome = self
            .client
            .sliding_window(key, &params)
            .await
            .map_err(|e| {
                metrics::record_store_error(Algorithm::SlidingWindow);
                RateLimitError::from(e)
            })?;

        metrics::record_decision(Algorithm::SlidingWindow, outcome.allowed);
        tracing::debug!(
            key = %key,
            allowed = outcome.allowed,
            count = outcome.count,
            "Sliding window evaluated"
        );
        Ok(outcome)
    }

    /// Events currently in the window. Prunes expired events first; the two
    /// steps are not atomic, which only matters for a reading racing an admit.
    pub async fn get_count(&self, key: &str) -> RateLimitResult<u64> {
        let cutoff = self.clock.now_millis() as f64 - self.window_millis() as f64;
        // Scores are whole milliseconds: `< cutoff` is `<= cutoff - 1`.
        self.client
            .zremrangebyscore(key, f64::NEG_INFINITY, cutoff - 1.0)
            .await?;
        Ok(self.client.zcard(key).await?)
    }

    pub async fn reset(&self, key: &str) -> RateLimitResult<()> {
        self.client.del(&[key.to_string()]).await?;
        Ok(())
    }

    /// Time until the oldest event in the window ages out.
    async fn retry_after(&self, key: &str) -> Duration {
        let oldest = match self.client.zrange(key, 0, 0).await {
            Ok(members) => members.into_iter().next(),
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Oldest window event unavailable");
                None
            }
        };
        let score = match oldest {
            Some(member) => match self.client.zscore(key, &member).await {
                Ok(score) => score,
                Err(e) => {
                    tracing::debug!(
                        key = %key,
                        error = %e,
                        "Oldest window event score unavailable"
                    );
                    None
                }
            },
            None => None,
        };
        match score {
            Some(score) => {
                let expires_at = score as u64 + self.window_millis() + 1;
                Duration::from_millis(expires_at.saturating_sub(self.clock.now_millis()))
            }
            None => self.window,
        }
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    fn algorithm(&self) -> Algorithm {
        Algorithm::SlidingWindow
    }

    fn limit(&self) -> u64 {
        self.limit
    }

    /// Each event counts once; only a cost of 1 is accepted.
    async fn check(&self, key: &str, cost: u64) -> RateLimitResult<RateLimitDecision> {
        if cost != 1 {
            return Err(RateLimitError::invalid_cost(cost, 1));
        }
        let outcome = self.allow(key).await?;
        let retry_after = if outcome.allowed {
            None
        } else {
            Some(self.retry_after(key).await)
        };
        Ok(RateLimitDecision {
            allowed: outcome.allowed,
            limit: self.limit,
            remaining: self.limit.saturating_sub(outcome.count),
            retry_after,
        })
    }

    async fn remaining(&self, key: &str) -> RateLimitResult<u64> {
        Ok(self.limit.saturating_sub(self.get_count(key).await?))
    }

    async fn reset(&self, key: &str) -> RateLimitResult<()> {
        SlidingWindowLimiter::reset(self, key).await
    }
}
