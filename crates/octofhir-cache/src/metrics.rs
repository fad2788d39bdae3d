//! Cache metrics recorded through the `metrics` facade.
//!
//! Nothing is exported from here; the binary (or embedding service) installs
//! whichever recorder it uses.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_NEGATIVE_HITS_TOTAL: &str = "cache_negative_hits_total";
    pub const CACHE_COALESCED_TOTAL: &str = "cache_coalesced_total";
    pub const CACHE_FAIL_OPEN_TOTAL: &str = "cache_fail_open_total";
    pub const CACHE_WRITE_ERRORS_TOTAL: &str = "cache_write_errors_total";
    pub const CACHE_INVALIDATED_KEYS_TOTAL: &str = "cache_invalidated_keys_total";

    pub const CACHE_LOCK_ACQUIRED_TOTAL: &str = "cache_lock_acquired_total";
    pub const CACHE_LOCK_BUSY_TOTAL: &str = "cache_lock_busy_total";

    pub const INVALIDATION_DROPPED_TOTAL: &str = "cache_invalidation_dropped_total";
    pub const INVALIDATION_FAILED_TOTAL: &str = "cache_invalidation_failed_total";
}

pub fn record_cache_hit() {
    counter!(names::CACHE_HITS_TOTAL).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// The key held the nil marker.
pub fn record_negative_hit() {
    counter!(names::CACHE_NEGATIVE_HITS_TOTAL).increment(1);
}

/// A caller received another caller's load result.
pub fn record_coalesced() {
    counter!(names::CACHE_COALESCED_TOTAL).increment(1);
}

/// The store was unreachable and the loader ran uncached.
pub fn record_fail_open() {
    counter!(names::CACHE_FAIL_OPEN_TOTAL).increment(1);
}

pub fn record_write_error() {
    counter!(names::CACHE_WRITE_ERRORS_TOTAL).increment(1);
}

pub fn record_invalidated(count: u64) {
    counter!(names::CACHE_INVALIDATED_KEYS_TOTAL).increment(count);
}

pub fn record_lock_acquired() {
    counter!(names::CACHE_LOCK_ACQUIRED_TOTAL).increment(1);
}

pub fn record_lock_busy() {
    counter!(names::CACHE_LOCK_BUSY_TOTAL).increment(1);
}

pub fn record_invalidation_dropped(reason: &'static str) {
    counter!(names::INVALIDATION_DROPPED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_invalidation_failed() {
    counter!(names::INVALIDATION_FAILED_TOTAL).increment(1);
}
