use std::time::Duration;

use anyhow::{Context, Result};
use octofhir_cache::{CacheManager, DistributedLock, keys};
use tokio_util::sync::CancellationToken;

use crate::cli::{LockAcquireArgs, LockCommand};
use crate::output::{print_field, print_success, print_warning};

pub async fn run(manager: &CacheManager, command: LockCommand) -> Result<()> {
    match command {
        LockCommand::Acquire(args) => acquire(manager, args).await,
    }
}

async fn acquire(manager: &CacheManager, args: LockAcquireArgs) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let key = keys::lock(&args.name);
    let lock = match manager.acquire_lock_with_cancel(&key, &cancel).await {
        Ok(lock) => lock,
        Err(e) if e.is_lock_busy() => {
            print_warning(&format!("{key} is held by another owner"));
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to acquire {key}")),
    };
    print_success(&format!("Acquired {key}"));
    print_field("Token", lock.token());
    print_field("TTL", format!("{} ms", lock.ttl().as_millis()));

    hold(&lock, Duration::from_secs(args.hold), &cancel).await?;

    if lock.release().await? {
        print_success(&format!("Released {key}"));
    } else {
        print_warning(&format!("{key} expired before release"));
    }
    Ok(())
}

/// Keeps the lock alive for `duration`, refreshing at half its TTL.
async fn hold(
    lock: &DistributedLock,
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + duration;
    let refresh_every = lock.ttl() / 2;

    loop {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Ok(());
        }
        let wake = deadline.min(now + refresh_every);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep_until(wake) => {}
        }
        if wake < deadline && !lock.refresh().await? {
            anyhow::bail!("lost {} before the hold period ended", lock.key());
        }
    }
}
