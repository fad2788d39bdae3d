//! Cache manager configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [cache]
//! default_ttl_secs = 300
//! negative_ttl_secs = 60
//!
//! [cache.ttls]
//! permission = 600
//! entity = 120
//!
//! [cache.lock]
//! ttl_ms = 10000
//! retry_count = 3
//! retry_delay_ms = 100
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Cache-aside manager settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for use cases without an explicit entry in `ttls`.
    pub default_ttl_secs: u64,

    /// Fixed TTL for the nil marker written after a "no data" load.
    /// Not jittered.
    pub negative_ttl_secs: u64,

    /// Per-use-case base TTLs in seconds, looked up by [`CacheConfig::ttl_for`].
    pub ttls: HashMap<String, u64>,

    /// Distributed lock settings.
    pub lock: LockConfig,

    /// Background invalidation worker pool.
    pub invalidation: InvalidationConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            negative_ttl_secs: 60,
            ttls: HashMap::new(),
            lock: LockConfig::default(),
            invalidation: InvalidationConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Base TTL for a named use case, falling back to the default.
    pub fn ttl_for(&self, use_case: &str) -> Duration {
        let secs = self
            .ttls
            .get(use_case)
            .copied()
            .unwrap_or(self.default_ttl_secs);
        Duration::from_secs(secs)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.default_ttl_secs == 0 {
            return Err("cache.default_ttl_secs must be > 0".into());
        }
        if self.negative_ttl_secs == 0 {
            return Err("cache.negative_ttl_secs must be > 0".into());
        }
        if let Some((name, _)) = self.ttls.iter().find(|(_, secs)| **secs == 0) {
            return Err(format!("cache.ttls.{name} must be > 0"));
        }
        self.lock.validate()?;
        self.invalidation.validate()
    }
}

/// Distributed lock acquisition settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lock lifetime in milliseconds. A holder that dies releases implicitly
    /// after this long.
    pub ttl_ms: u64,

    /// Total SET NX attempts before giving up with `LockBusy`.
    pub retry_count: u32,

    /// Fixed delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 10_000,
            retry_count: 3,
            retry_delay_ms: 100,
        }
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_ms == 0 {
            return Err("cache.lock.ttl_ms must be > 0".into());
        }
        if self.retry_count == 0 {
            return Err("cache.lock.retry_count must be >= 1".into());
        }
        Ok(())
    }
}

/// Invalidation worker pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InvalidationConfig {
    /// Bounded queue length; submissions beyond it are dropped and counted.
    pub queue_capacity: usize,

    /// Number of worker tasks draining the queue.
    pub workers: usize,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            workers: 2,
        }
    }
}

impl InvalidationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("cache.invalidation.queue_capacity must be > 0".into());
        }
        if self.workers == 0 {
            return Err("cache.invalidation.workers must be > 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.negative_ttl(), Duration::from_secs(60));
        assert_eq!(config.lock.retry_count, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ttl_for_use_case() {
        let mut config = CacheConfig::default();
        config.ttls.insert("permission".into(), 600);

        assert_eq!(config.ttl_for("permission"), Duration::from_secs(600));
        assert_eq!(config.ttl_for("unknown"), Duration::from_secs(300));
    }

    #[test]
    fn test_zero_use_case_ttl_rejected() {
        let mut config = CacheConfig::default();
        config.ttls.insert("entity".into(), 0);
        assert!(config.validate().unwrap_err().contains("cache.ttls.entity"));
    }

    #[test]
    fn test_lock_requires_one_attempt() {
        let config = LockConfig {
            retry_count: 0,
            ..LockConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"negative_ttl_secs": 5, "lock": {"retry_count": 10}}"#)
                .unwrap();
        assert_eq!(config.negative_ttl_secs, 5);
        assert_eq!(config.default_ttl_secs, 300);
        assert_eq!(config.lock.retry_count, 10);
        assert_eq!(config.lock.ttl_ms, 10_000);
    }
}
