//! Limiters against a real Redis, shared by several independent pools.
//!
//! Requires Docker: `cargo test -p octofhir-ratelimit -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use octofhir_kv::{KvClient, RedisConfig, connect_redis};
use octofhir_ratelimit::{SlidingWindowLimiter, TokenBucketLimiter};
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

async fn client(namespace: &str) -> KvClient {
    let config = RedisConfig {
        enabled: true,
        url: get_redis_url().await,
        namespace: namespace.to_string(),
        ..RedisConfig::default()
    };
    KvClient::new(
        Arc::new(connect_redis(&config).await.expect("connect")),
        namespace,
    )
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_token_bucket_is_shared_across_instances() {
    let mut handles = Vec::new();
    for _ in 0..4 {
        let limiter = Arc::new(
            TokenBucketLimiter::new(client("it-bucket").await, 20, 0.001).unwrap(),
        );
        for _ in 0..15 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.allow("shared").await.unwrap().allowed
            }));
        }
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 20);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_sliding_window_is_shared_across_instances() {
    let mut handles = Vec::new();
    for _ in 0..4 {
        let limiter = Arc::new(
            SlidingWindowLimiter::new(client("it-window").await, 12, Duration::from_secs(60))
                .unwrap(),
        );
        for _ in 0..10 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.allow("shared").await.unwrap().allowed
            }));
        }
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 12);

    let observer = SlidingWindowLimiter::new(client("it-window").await, 12, Duration::from_secs(60))
        .unwrap();
    assert_eq!(observer.get_count("shared").await.unwrap(), 12);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_token_bucket_remaining_and_reset() {
    let limiter = TokenBucketLimiter::new(client("it-bucket-reset").await, 5, 0.001).unwrap();
    limiter.allow_n("k", 3).await.unwrap();
    let remaining = limiter.get_remaining("k").await.unwrap();
    assert!((2.0..2.1).contains(&remaining));

    limiter.reset("k").await.unwrap();
    assert_eq!(limiter.get_remaining("k").await.unwrap(), 5.0);
}
