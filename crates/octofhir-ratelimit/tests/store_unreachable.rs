//! Admission when the configured Redis cannot be reached.

use std::sync::Arc;

use octofhir_kv::{KvClient, MemoryStore, RedisConfig, create_kv_client};
use octofhir_ratelimit::{Admission, FailurePolicy, RateLimitConfig, RateLimitService};

fn unreachable_redis() -> RedisConfig {
    RedisConfig {
        enabled: true,
        url: "redis://127.0.0.1:1".to_string(),
        timeout_ms: 200,
        command_timeout_ms: 200,
        ..RedisConfig::default()
    }
}

fn fail_closed() -> RateLimitConfig {
    RateLimitConfig {
        failure_policy: FailurePolicy::Closed,
        ..RateLimitConfig::default()
    }
}

#[tokio::test]
async fn test_unreachable_redis_does_not_yield_a_local_limiter() {
    let err = create_kv_client(&unreachable_redis()).await.unwrap_err();
    assert!(err.is_transport(), "{err}");
}

#[tokio::test]
async fn test_fail_closed_service_degrades_while_store_is_down() {
    let store = Arc::new(MemoryStore::new());
    let service =
        RateLimitService::from_config(KvClient::new(store.clone(), "test"), &fail_closed())
            .unwrap();
    store.set_available(false);

    let admission = service.evaluate("1.2.3.4").await.unwrap();
    assert!(matches!(
        admission,
        Admission::Degraded {
            policy: FailurePolicy::Closed,
            ..
        }
    ));
    assert!(!admission.is_allowed());
}
