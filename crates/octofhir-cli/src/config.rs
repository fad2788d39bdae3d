use octofhir_cache::CacheConfig;
use octofhir_kv::RedisConfig;
use octofhir_ratelimit::{FailurePolicy, RateLimitConfig};
use serde::{Deserialize, Serialize};

/// Everything the operator binary reads from `octofhir-cache.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.redis.validate().map_err(|e| format!("redis: {e}"))?;
        self.cache.validate().map_err(|e| format!("cache: {e}"))?;
        self.rate_limit
            .validate()
            .map_err(|e| format!("rate_limit: {e}"))?;
        // A memory fallback admits during a Redis outage, which a fail-closed
        // limiter must not do.
        if self.redis.enabled
            && self.redis.fallback_to_memory
            && self.rate_limit.enabled
            && self.rate_limit.failure_policy == FailurePolicy::Closed
        {
            return Err("redis.fallback_to_memory cannot be used with a fail-closed rate limiter".into());
        }
        if self.logging.level.trim().is_empty() {
            return Err("logging.level must not be empty".into());
        }
        Ok(())
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "octofhir-cache.toml";

    /// Layers the config file (if any) under `OCTOFHIR__SECTION__FIELD`
    /// environment overrides, then validates the result.
    ///
    /// An explicit `path` that does not exist is an error; the default file
    /// is optional.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if !pathbuf.exists() {
                    return Err(format!("config file not found: {p}"));
                }
                builder = builder.add_source(File::from(pathbuf));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // e.g. OCTOFHIR__REDIS__URL=redis://cache:6379
        builder = builder.add_source(
            Environment::with_prefix("OCTOFHIR")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_ratelimit::Algorithm;
    use std::path::PathBuf;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.redis.enabled);
        assert_eq!(config.redis.namespace, "octofhir");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let path = write_temp(
            "octofhir-cache.toml",
            r#"
[redis]
namespace = "staging"

[cache]
negative_ttl_secs = 15

[cache.ttls]
permission = 120

[rate_limit]
algorithm = "sliding_window"
limit = 50
window_ms = 1000
failure_policy = "closed"

[logging]
level = "debug"
"#,
        );
        let config = loader::load_config(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.redis.namespace, "staging");
        assert_eq!(config.cache.negative_ttl_secs, 15);
        assert_eq!(config.cache.ttl_for("permission").as_secs(), 120);
        assert_eq!(config.cache.default_ttl_secs, 300);
        assert_eq!(config.rate_limit.algorithm, Algorithm::SlidingWindow);
        assert_eq!(config.rate_limit.limit, 50);
        assert_eq!(config.rate_limit.failure_policy, FailurePolicy::Closed);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let path = write_temp(
            "invalid-octofhir-cache.toml",
            r#"
[rate_limit]
algorithm = "token_bucket"
capacity = 0
"#,
        );
        let result = loader::load_config(path.to_str());
        std::fs::remove_file(&path).ok();

        let err = result.unwrap_err();
        assert!(err.starts_with("rate_limit:"), "{err}");
    }

    #[test]
    fn test_memory_fallback_conflicts_with_fail_closed() {
        let mut config = AppConfig::default();
        config.redis.enabled = true;
        config.redis.fallback_to_memory = true;
        assert!(config.validate().is_ok());

        config.rate_limit.failure_policy = FailurePolicy::Closed;
        let err = config.validate().unwrap_err();
        assert!(err.contains("fallback_to_memory"), "{err}");

        config.redis.fallback_to_memory = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = loader::load_config(Some("/nonexistent/octofhir-cache.toml")).unwrap_err();
        assert!(err.contains("not found"));
    }
}
