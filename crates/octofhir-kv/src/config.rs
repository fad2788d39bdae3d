use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis configuration for the shared coordination store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis. When disabled the in-process memory store is used,
    /// which only coordinates within a single instance.
    /// Default: false
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Pool wait/create/recycle timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound for a single command round-trip in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Namespace prefix prepended to every key (`<namespace>:<key>`)
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Start on the in-process store when Redis is enabled but unreachable.
    /// Limits and locks then only hold within this instance and the
    /// limiter's failure policy no longer applies to the outage.
    /// Default: false
    #[serde(default)]
    pub fallback_to_memory: bool,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_command_timeout_ms() -> u64 {
    2000
}

fn default_namespace() -> String {
    "octofhir".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            namespace: default_namespace(),
            fallback_to_memory: false,
        }
    }
}

impl RedisConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.url.is_empty() {
            return Err("redis.url must not be empty when redis.enabled=true".into());
        }
        if self.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        if self.timeout_ms == 0 || self.command_timeout_ms == 0 {
            return Err("redis timeouts must be > 0".into());
        }
        if self.namespace.contains(['*', '?', '[', ']']) {
            return Err("redis.namespace must not contain glob characters".into());
        }
        Ok(())
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
