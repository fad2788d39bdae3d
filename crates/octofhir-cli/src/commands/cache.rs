use std::time::Duration;

use anyhow::{Context, Result};
use octofhir_cache::CacheManager;
use octofhir_kv::KeyTtl;
use serde_json::Value;

use crate::cli::{CacheCommand, CacheSetArgs};
use crate::output::{print_json, print_success, print_warning};

pub async fn run(manager: &CacheManager, command: CacheCommand) -> Result<()> {
    match command {
        CacheCommand::Get(args) => get(manager, &args.key).await,
        CacheCommand::Set(args) => set(manager, args).await,
        CacheCommand::Ttl(args) => ttl(manager, &args.key).await,
        CacheCommand::Delete(args) => {
            let removed = manager.delete(&args.keys).await?;
            print_success(&format!("Deleted {removed} of {} keys", args.keys.len()));
            Ok(())
        }
        CacheCommand::Invalidate(args) => {
            let removed = manager.delete_by_pattern(&args.pattern).await?;
            print_success(&format!("Invalidated {removed} keys matching {}*", args.pattern));
            Ok(())
        }
    }
}

async fn get(manager: &CacheManager, key: &str) -> Result<()> {
    match manager.get_object::<Value>(key).await {
        Ok(Some(value)) => print_json(&value),
        Ok(None) => print_warning(&format!("{key} is not cached")),
        Err(e) if e.is_not_found() => print_warning(&format!("{key} is cached as absent")),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {key}")),
    }
    Ok(())
}

async fn set(manager: &CacheManager, args: CacheSetArgs) -> Result<()> {
    let ttl = args
        .ttl
        .map(Duration::from_secs)
        .unwrap_or_else(|| manager.config().ttl_for(&args.use_case));

    if args.absent {
        manager
            .set_object::<Value>(&args.key, None, ttl)
            .await
            .with_context(|| format!("Failed to write {}", args.key))?;
        print_success(&format!(
            "{} cached as absent for {}s",
            args.key,
            manager.config().negative_ttl().as_secs()
        ));
        return Ok(());
    }

    let raw = args.value.unwrap_or_default();
    let value: Value = serde_json::from_str(&raw).context("Value is not valid JSON")?;
    manager
        .set_object(&args.key, Some(&value), ttl)
        .await
        .with_context(|| format!("Failed to write {}", args.key))?;
    print_success(&format!("{} cached (base TTL {}s)", args.key, ttl.as_secs()));
    Ok(())
}

async fn ttl(manager: &CacheManager, key: &str) -> Result<()> {
    match manager.client().ttl(key).await? {
        KeyTtl::Missing => print_warning(&format!("{key} does not exist")),
        KeyTtl::Persistent => println!("{key}: no expiry"),
        KeyTtl::ExpiresIn(remaining) => {
            println!("{key}: expires in {} ms", remaining.as_millis())
        }
    }
    Ok(())
}
