mod cli;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use octofhir_cache::CacheManager;
use octofhir_kv::{RedisConfig, create_kv_client};
use octofhir_ratelimit::RateLimitService;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    observability::init_tracing("warn");

    let app_config = config::loader::load_config(cli.config.as_deref()).map_err(|e| anyhow!(e))?;
    observability::apply_logging_level(&app_config.logging.level);

    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&app_config)?);
        return Ok(());
    }

    // Operator commands must act on the shared store, never on a local stand-in.
    let redis = RedisConfig {
        fallback_to_memory: false,
        ..app_config.redis.clone()
    };
    let client = create_kv_client(&redis)
        .await
        .with_context(|| format!("Cannot reach {}", redis.url))?;
    tracing::info!(
        backend = client.backend(),
        namespace = client.namespace(),
        "Store client ready"
    );

    match cli.command {
        Commands::Ping => commands::ping::ping(&client).await,
        Commands::Cache(command) => {
            let manager = CacheManager::new(client, app_config.cache);
            commands::cache::run(&manager, command).await
        }
        Commands::Limit(command) => {
            let service = RateLimitService::from_config(client, &app_config.rate_limit)?;
            commands::limit::run(&service, command).await
        }
        Commands::Lock(command) => {
            let manager = CacheManager::new(client, app_config.cache);
            commands::lock::run(&manager, command).await
        }
        Commands::Config => Ok(()),
    }
}
