//! Algorithm-independent limiter interface.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RateLimitResult;

/// Which admission algorithm a limiter implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Smooth rate with bursts up to capacity.
    #[default]
    TokenBucket,
    /// Fixed budget over a rolling window.
    SlidingWindow,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::SlidingWindow => "sliding_window",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one admission check, in the units the HTTP quota headers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Bucket capacity or window limit.
    pub limit: u64,
    /// Whole admissions left after this check.
    pub remaining: u64,
    /// When a rejected caller can expect to be admitted again.
    pub retry_after: Option<Duration>,
}

/// A limiter backed by the shared store.
///
/// Every `check` is a single atomic store-side step, so concurrent callers in
/// any number of processes see a consistent count.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Bucket capacity or window limit.
    fn limit(&self) -> u64;

    /// Attempts to admit `cost` units for `key`.
    async fn check(&self, key: &str, cost: u64) -> RateLimitResult<RateLimitDecision>;

    /// Whole admissions currently available for `key`, without consuming any.
    async fn remaining(&self, key: &str) -> RateLimitResult<u64>;

    /// Clears the state for `key`.
    async fn reset(&self, key: &str) -> RateLimitResult<()>;
}

/// Seconds for a `Retry-After` header: rounded up, at least one.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}
