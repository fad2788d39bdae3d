//! Distributed rate limiting over the shared key-value store.
//!
//! ## Algorithms
//!
//! | Algorithm | State | Admits |
//! |-----------|-------|--------|
//! | [`TokenBucketLimiter`] | hash `{tokens, last_refill}` | bursts up to `capacity`, `refill_per_sec` on average |
//! | [`SlidingWindowLimiter`] | sorted set of event timestamps | at most `limit` per rolling `window` |
//!
//! Both evaluate in a single atomic store-side script, so limits hold across
//! every process sharing the store.
//!
//! ## Failure Policy
//!
//! A limiter that cannot reach its store returns [`RateLimitError::Store`],
//! never a silent rejection. [`RateLimitService`] turns that into
//! [`Admission::Degraded`] and applies the configured [`FailurePolicy`].

pub mod config;
pub mod dimension;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod service;
pub mod sliding_window;
pub mod token_bucket;

pub use config::RateLimitConfig;
pub use dimension::{RateLimitDimension, RateLimitSubject, extract_ip_address};
pub use error::{RateLimitError, RateLimitResult};
pub use limiter::{Algorithm, RateLimitDecision, RateLimiter};
pub use middleware::rate_limit_middleware;
pub use service::{Admission, FailurePolicy, RateLimitService};
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::{MAX_REFILL_PERIOD, TokenBucketLimiter};
