use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::dimension::RateLimitDimension;
use crate::error::RateLimitError;
use crate::limiter::Algorithm;
use crate::service::FailurePolicy;
use crate::token_bucket;

/// Rate limiting configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [rate_limit]
/// enabled = true
/// algorithm = "sliding_window"
/// limit = 100
/// window_ms = 60000
/// dimension = "user"
/// failure_policy = "closed"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// When disabled the middleware passes every request through.
    pub enabled: bool,

    pub algorithm: Algorithm,

    /// Token bucket: maximum burst.
    pub capacity: u64,

    /// Token bucket: tokens added per second.
    pub refill_per_sec: f64,

    /// Sliding window: events admitted per window.
    pub limit: u64,

    /// Sliding window: width in milliseconds.
    pub window_ms: u64,

    /// What requests are counted per.
    pub dimension: RateLimitDimension,

    /// Behaviour when the store cannot be reached.
    pub failure_policy: FailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: Algorithm::TokenBucket,
            capacity: 100,
            refill_per_sec: 10.0,
            limit: 100,
            window_ms: 60_000,
            dimension: RateLimitDimension::Ip,
            failure_policy: FailurePolicy::Open,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Checks the parameters of the selected algorithm only.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        match self.algorithm {
            Algorithm::TokenBucket => {
                token_bucket::check_parameters(self.capacity, self.refill_per_sec)
                    .map_err(|e| RateLimitError::config(format!("rate_limit.{e}")))?;
            }
            Algorithm::SlidingWindow => {
                if self.limit == 0 {
                    return Err(RateLimitError::config("rate_limit.limit must be > 0"));
                }
                if self.window_ms == 0 {
                    return Err(RateLimitError::config("rate_limit.window_ms must be > 0"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_defaults() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.algorithm, Algorithm::TokenBucket);
        assert_eq!(config.failure_policy, FailurePolicy::Open);
        assert_eq!(config.window(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_only_selected_algorithm_is_validated() {
        let config = RateLimitConfig {
            algorithm: Algorithm::SlidingWindow,
            capacity: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = RateLimitConfig {
            algorithm: Algorithm::SlidingWindow,
            window_ms: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_refill_rate_too_slow_for_capacity_rejected() {
        let config = RateLimitConfig {
            capacity: 10,
            refill_per_sec: 1e-19,
            ..RateLimitConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("refill_per_sec"), "{err}");
    }

    #[test]
    fn test_deserialize_from_snake_case() {
        let config: RateLimitConfig = serde_json::from_str(
            r#"{"algorithm": "sliding_window", "limit": 3, "dimension": "api_path", "failure_policy": "closed"}"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, Algorithm::SlidingWindow);
        assert_eq!(config.limit, 3);
        assert_eq!(config.dimension, RateLimitDimension::ApiPath);
        assert_eq!(config.failure_policy, FailurePolicy::Closed);
    }
}
