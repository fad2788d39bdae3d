//! Admission decisions with an explicit policy for store failures.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use octofhir_kv::{KvClient, SharedClock, system_clock};

use crate::config::RateLimitConfig;
use crate::dimension::RateLimitDimension;
use crate::error::{RateLimitError, RateLimitResult};
use crate::limiter::{Algorithm, RateLimitDecision, RateLimiter};
use crate::metrics;
use crate::sliding_window::SlidingWindowLimiter;
use crate::token_bucket::TokenBucketLimiter;

/// What to do when the limiter's store cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Admit the request.
    #[default]
    Open,
    /// Reject the request.
    Closed,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Open => "open",
            FailurePolicy::Closed => "closed",
        }
    }

    pub fn admits(&self) -> bool {
        matches!(self, FailurePolicy::Open)
    }
}

/// Result of [`RateLimitService::evaluate`].
#[derive(Debug, Clone)]
pub enum Admission {
    /// The limiter admitted the request.
    Allowed(RateLimitDecision),
    /// The limiter rejected the request; quota is exhausted.
    Rejected(RateLimitDecision),
    /// The limiter could not decide; `policy` decided instead.
    Degraded {
        policy: FailurePolicy,
        error: RateLimitError,
    },
}

impl Admission {
    /// Whether the request should proceed.
    pub fn is_allowed(&self) -> bool {
        match self {
            Admission::Allowed(_) => true,
            Admission::Rejected(_) => false,
            Admission::Degraded { policy, .. } => policy.admits(),
        }
    }

    pub fn decision(&self) -> Option<&RateLimitDecision> {
        match self {
            Admission::Allowed(d) | Admission::Rejected(d) => Some(d),
            Admission::Degraded { .. } => None,
        }
    }
}

/// A limiter bound to a dimension and a failure policy.
#[derive(Clone)]
pub struct RateLimitService {
    limiter: Arc<dyn RateLimiter>,
    dimension: RateLimitDimension,
    policy: FailurePolicy,
    enabled: bool,
}

impl std::fmt::Debug for RateLimitService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitService")
            .field("algorithm", &self.limiter.algorithm())
            .field("limit", &self.limiter.limit())
            .field("dimension", &self.dimension)
            .field("policy", &self.policy)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl RateLimitService {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        dimension: RateLimitDimension,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            limiter,
            dimension,
            policy,
            enabled: true,
        }
    }

    /// A disabled service is skipped by the middleware.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builds the limiter selected by `config`.
    pub fn from_config(client: KvClient, config: &RateLimitConfig) -> RateLimitResult<Self> {
        Self::from_config_with_clock(client, config, system_clock())
    }

    pub fn from_config_with_clock(
        client: KvClient,
        config: &RateLimitConfig,
        clock: SharedClock,
    ) -> RateLimitResult<Self> {
        config.validate()?;
        let limiter: Arc<dyn RateLimiter> = match config.algorithm {
            Algorithm::TokenBucket => Arc::new(
                TokenBucketLimiter::new(client, config.capacity, config.refill_per_sec)?
                    .with_clock(clock),
            ),
            Algorithm::SlidingWindow => Arc::new(
                SlidingWindowLimiter::new(client, config.limit, config.window())?
                    .with_clock(clock),
            ),
        };
        Ok(
            Self::new(limiter, config.dimension, config.failure_policy)
                .with_enabled(config.enabled),
        )
    }

    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    pub fn dimension(&self) -> RateLimitDimension {
        self.dimension
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Key the limiter state for `identity` lives under.
    pub fn key_for(&self, identity: &str) -> String {
        self.dimension.key(self.limiter.algorithm(), identity)
    }

    /// Admits one unit for `identity`.
    pub async fn evaluate(&self, identity: &str) -> RateLimitResult<Admission> {
        self.evaluate_n(identity, 1).await
    }

    /// Admits `cost` units for `identity`. Store failures become
    /// [`Admission::Degraded`]; invalid input is returned as an error.
    pub async fn evaluate_n(&self, identity: &str, cost: u64) -> RateLimitResult<Admission> {
        let key = self.key_for(identity);
        match self.limiter.check(&key, cost).await {
            Ok(decision) if decision.allowed => Ok(Admission::Allowed(decision)),
            Ok(decision) => {
                tracing::debug!(
                    key = %key,
                    limit = decision.limit,
                    "Rate limit exceeded"
                );
                Ok(Admission::Rejected(decision))
            }
            Err(error) if error.is_store() => {
                tracing::warn!(
                    key = %key,
                    error = %error,
                    policy = self.policy.as_str(),
                    "Rate limiter unavailable, applying failure policy"
                );
                metrics::record_degraded(self.policy);
                Ok(Admission::Degraded {
                    policy: self.policy,
                    error,
                })
            }
            Err(error) => Err(error),
        }
    }

    pub async fn remaining(&self, identity: &str) -> RateLimitResult<u64> {
        self.limiter.remaining(&self.key_for(identity)).await
    }

    pub async fn reset(&self, identity: &str) -> RateLimitResult<()> {
        self.limiter.reset(&self.key_for(identity)).await
    }
}
