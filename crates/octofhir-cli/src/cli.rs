use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "octofhir-cache")]
#[command(about = "Inspect and operate the shared cache and rate limit store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./octofhir-cache.toml when present)
    #[arg(short, long, global = true, env = "OCTOFHIR_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the store is reachable
    Ping,
    /// Read, write and invalidate cache entries
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Evaluate and reset rate limits
    #[command(subcommand)]
    Limit(LimitCommand),
    /// Work with distributed locks
    #[command(subcommand)]
    Lock(LockCommand),
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Read a cached JSON value
    Get(CacheKeyArgs),
    /// Write a JSON value (use --absent to write the nil marker)
    Set(CacheSetArgs),
    /// Show the remaining TTL of a key
    Ttl(CacheKeyArgs),
    /// Delete specific keys
    Delete(CacheDeleteArgs),
    /// Delete every key starting with a prefix
    Invalidate(CacheInvalidateArgs),
}

#[derive(clap::Args)]
pub struct CacheKeyArgs {
    /// Logical key, without the namespace prefix
    pub key: String,
}

#[derive(clap::Args)]
pub struct CacheSetArgs {
    /// Logical key, without the namespace prefix
    pub key: String,
    /// JSON value to store
    #[arg(required_unless_present = "absent")]
    pub value: Option<String>,
    /// Remember the key as absent instead of storing a value
    #[arg(long, conflicts_with = "value")]
    pub absent: bool,
    /// Base TTL in seconds (defaults to the configured TTL for --use-case)
    #[arg(long)]
    pub ttl: Option<u64>,
    /// Use case whose configured TTL applies when --ttl is omitted
    #[arg(long, default_value = "default")]
    pub use_case: String,
}

#[derive(clap::Args)]
pub struct CacheDeleteArgs {
    /// Logical keys to delete
    #[arg(required = true)]
    pub keys: Vec<String>,
}

#[derive(clap::Args)]
pub struct CacheInvalidateArgs {
    /// Key prefix, e.g. "Patient:" or "perm:u1:"
    pub pattern: String,
}

#[derive(Subcommand)]
pub enum LimitCommand {
    /// Count a request against an identity's quota
    Check(LimitCheckArgs),
    /// Show the admissions an identity has left
    Status(LimitIdentityArgs),
    /// Clear an identity's limiter state
    Reset(LimitIdentityArgs),
}

#[derive(clap::Args)]
pub struct LimitCheckArgs {
    /// Identity as produced by the configured dimension (e.g. an IP address)
    pub identity: String,
    /// Tokens to take (token bucket only)
    #[arg(long, default_value_t = 1)]
    pub cost: u64,
}

#[derive(clap::Args)]
pub struct LimitIdentityArgs {
    /// Identity as produced by the configured dimension (e.g. an IP address)
    pub identity: String,
}

#[derive(Subcommand)]
pub enum LockCommand {
    /// Acquire a lock, hold it, then release it
    Acquire(LockAcquireArgs),
}

#[derive(clap::Args)]
pub struct LockAcquireArgs {
    /// Lock name (stored under "lock:<name>")
    pub name: String,
    /// Seconds to hold the lock before releasing it; Ctrl-C releases early
    #[arg(long, default_value_t = 0)]
    pub hold: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_cache_set_with_ttl() {
        let cli = Cli::try_parse_from([
            "octofhir-cache",
            "cache",
            "set",
            "Patient:1",
            r#"{"id":"1"}"#,
            "--ttl",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Cache(CacheCommand::Set(args)) => {
                assert_eq!(args.key, "Patient:1");
                assert_eq!(args.value.as_deref(), Some(r#"{"id":"1"}"#));
                assert_eq!(args.ttl, Some(30));
                assert!(!args.absent);
            }
            _ => panic!("expected cache set"),
        }
    }

    #[test]
    fn test_cache_set_requires_value_or_absent() {
        assert!(Cli::try_parse_from(["octofhir-cache", "cache", "set", "k"]).is_err());
        assert!(Cli::try_parse_from(["octofhir-cache", "cache", "set", "k", "--absent"]).is_ok());
        assert!(
            Cli::try_parse_from(["octofhir-cache", "cache", "set", "k", "1", "--absent"]).is_err()
        );
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from([
            "octofhir-cache",
            "limit",
            "check",
            "10.0.0.1",
            "--config",
            "prod.toml",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("prod.toml"));
        match cli.command {
            Commands::Limit(LimitCommand::Check(args)) => assert_eq!(args.cost, 1),
            _ => panic!("expected limit check"),
        }
    }
}
