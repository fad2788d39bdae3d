//! Limiter metrics recorded through the `metrics` facade.

use metrics::counter;

use crate::limiter::Algorithm;
use crate::service::FailurePolicy;

/// Metric names as constants for consistency.
pub mod names {
    pub const RATELIMIT_ALLOWED_TOTAL: &str = "ratelimit_allowed_total";
    pub const RATELIMIT_REJECTED_TOTAL: &str = "ratelimit_rejected_total";
    pub const RATELIMIT_STORE_ERRORS_TOTAL: &str = "ratelimit_store_errors_total";
    pub const RATELIMIT_DEGRADED_TOTAL: &str = "ratelimit_degraded_total";
}

pub fn record_decision(algorithm: Algorithm, allowed: bool) {
    let name = if allowed {
        names::RATELIMIT_ALLOWED_TOTAL
    } else {
        names::RATELIMIT_REJECTED_TOTAL
    };
    counter!(name, "algorithm" => algorithm.as_str()).increment(1);
}

pub fn record_store_error(algorithm: Algorithm) {
    counter!(names::RATELIMIT_STORE_ERRORS_TOTAL, "algorithm" => algorithm.as_str()).increment(1);
}

/// A decision was made by the failure policy instead of the limiter.
pub fn record_degraded(policy: FailurePolicy) {
    counter!(names::RATELIMIT_DEGRADED_TOTAL, "policy" => policy.as_str()).increment(1);
}
