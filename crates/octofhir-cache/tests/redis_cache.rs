//! Cache manager against a real Redis shared by two "instances".
//!
//! Requires Docker: `cargo test -p octofhir-cache -- --ignored`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use octofhir_cache::{CacheConfig, CacheManager, keys};
use octofhir_kv::{KvClient, RedisConfig, connect_redis};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");
            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            (container, format!("redis://127.0.0.1:{}", host_port))
        })
        .await;
    url.clone()
}

/// A fresh manager with its own pool, as a separate process would have.
async fn instance(namespace: &str) -> CacheManager {
    let config = RedisConfig {
        enabled: true,
        url: get_redis_url().await,
        namespace: namespace.to_string(),
        ..RedisConfig::default()
    };
    let store = connect_redis(&config).await.expect("connect");
    CacheManager::new(
        KvClient::new(Arc::new(store), namespace),
        CacheConfig::default(),
    )
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_instances_share_cached_values() {
    let a = instance("it-share").await;
    let b = instance("it-share").await;
    let calls = AtomicUsize::new(0);
    let key = keys::entity("patient", "1");

    let first: String = a
        .get_or_load(&key, Duration::from_secs(60), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some("alice".to_string()))
        })
        .await
        .unwrap();
    let second: String = b
        .get_or_load(&key, Duration::from_secs(60), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some("bob".to_string()))
        })
        .await
        .unwrap();

    assert_eq!(first, "alice");
    assert_eq!(second, "alice");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_negative_entry_is_visible_to_other_instance() {
    let a = instance("it-negative").await;
    let b = instance("it-negative").await;
    let key = keys::entity("patient", "absent");

    let err = a
        .get_or_load::<String, _, _>(&key, Duration::from_secs(60), || async { Ok(None) })
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = b.get_object::<String>(&key).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_lock_excludes_other_instance() {
    let a = instance("it-lock").await;
    let b = instance("it-lock").await;
    let key = keys::lock("nightly-report");

    let held = a.acquire_lock(&key).await.unwrap();
    assert!(b.acquire_lock(&key).await.unwrap_err().is_lock_busy());
    assert!(held.release().await.unwrap());
    let taken = b.acquire_lock(&key).await.unwrap();
    assert!(taken.release().await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_delete_by_pattern_over_many_batches() {
    let cache = instance("it-pattern").await;
    for i in 0..350 {
        cache
            .set_object(
                &keys::permission("alice", &format!("domain-{i}")),
                Some(&i),
                Duration::from_secs(600),
            )
            .await
            .unwrap();
    }
    cache
        .set_object(
            &keys::permission("bob", "domain-1"),
            Some(&1),
            Duration::from_secs(600),
        )
        .await
        .unwrap();

    let removed = cache
        .delete_by_pattern(&keys::permission_pattern("alice"))
        .await
        .unwrap();
    assert_eq!(removed, 350);
    assert_eq!(
        cache
            .get_object::<i32>(&keys::permission("bob", "domain-1"))
            .await
            .unwrap(),
        Some(1)
    );
}
