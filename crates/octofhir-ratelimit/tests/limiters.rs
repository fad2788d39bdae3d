//! Limiter behaviour with a manually stepped clock.

use std::sync::Arc;
use std::time::Duration;

use octofhir_kv::{KvClient, ManualClock, MemoryStore};
use octofhir_ratelimit::{RateLimiter, SlidingWindowLimiter, TokenBucketLimiter};

/// 2026-01-01T00:00:00Z
const START_MS: u64 = 1_767_225_600_000;

fn client(clock: &Arc<ManualClock>) -> KvClient {
    KvClient::new(Arc::new(MemoryStore::with_clock(clock.clone())), "test")
}

fn bucket(capacity: u64, rate: f64) -> (TokenBucketLimiter, Arc<ManualClock>) {
    let clock = ManualClock::new(START_MS);
    let limiter = TokenBucketLimiter::new(client(&clock), capacity, rate)
        .unwrap()
        .with_clock(clock.clone());
    (limiter, clock)
}

fn window(limit: u64, window: Duration) -> (SlidingWindowLimiter, Arc<ManualClock>) {
    let clock = ManualClock::new(START_MS);
    let limiter = SlidingWindowLimiter::new(client(&clock), limit, window)
        .unwrap()
        .with_clock(clock.clone());
    (limiter, clock)
}

// ==================== Token bucket ====================

#[tokio::test]
async fn test_bucket_burst_then_refill() {
    let (limiter, clock) = bucket(10, 2.0);

    for i in 0..10 {
        let outcome = limiter.allow("client").await.unwrap();
        assert!(outcome.allowed, "request {i} should be admitted");
        assert_eq!(outcome.tokens, (9 - i) as f64);
    }
    assert!(!limiter.allow("client").await.unwrap().allowed);

    clock.advance(Duration::from_secs(1));
    assert!(limiter.allow("client").await.unwrap().allowed);
    assert!(limiter.allow("client").await.unwrap().allowed);
    assert!(!limiter.allow("client").await.unwrap().allowed);
}

#[tokio::test]
async fn test_bucket_rejection_does_not_consume() {
    let (limiter, _) = bucket(3, 1.0);
    assert!(limiter.allow_n("client", 2).await.unwrap().allowed);

    let rejected = limiter.allow_n("client", 2).await.unwrap();
    assert!(!rejected.allowed);
    assert_eq!(rejected.tokens, 1.0);
    assert_eq!(limiter.get_remaining("client").await.unwrap(), 1.0);
    assert!(limiter.allow("client").await.unwrap().allowed);
}

#[tokio::test]
async fn test_bucket_remaining_never_exceeds_capacity() {
    let (limiter, clock) = bucket(5, 1.0);
    assert_eq!(limiter.get_remaining("client").await.unwrap(), 5.0);

    for _ in 0..5 {
        limiter.allow("client").await.unwrap();
    }
    assert_eq!(limiter.get_remaining("client").await.unwrap(), 0.0);

    clock.advance(Duration::from_secs(3));
    assert_eq!(limiter.get_remaining("client").await.unwrap(), 3.0);

    // Longer than the state TTL: the key is gone and the bucket reads full.
    clock.advance(Duration::from_secs(3_600));
    assert_eq!(limiter.get_remaining("client").await.unwrap(), 5.0);
}

#[tokio::test]
async fn test_bucket_refill_is_monotonic_and_capped() {
    let (limiter, clock) = bucket(10, 0.5);
    for _ in 0..10 {
        limiter.allow("client").await.unwrap();
    }

    let mut previous = limiter.get_remaining("client").await.unwrap();
    for step in 1..=6u64 {
        clock.advance(Duration::from_secs(step));
        let now = limiter.get_remaining("client").await.unwrap();
        let expected = (previous + step as f64 * 0.5).min(10.0);
        assert_eq!(now, expected);
        assert!(now >= previous);
        previous = now;
    }
    assert_eq!(previous, 10.0);
}

#[tokio::test]
async fn test_bucket_get_remaining_is_read_only() {
    let (limiter, clock) = bucket(4, 1.0);
    for _ in 0..4 {
        limiter.allow("client").await.unwrap();
    }
    clock.advance(Duration::from_secs(2));
    assert_eq!(limiter.get_remaining("client").await.unwrap(), 2.0);
    assert_eq!(limiter.get_remaining("client").await.unwrap(), 2.0);

    let outcome = limiter.allow("client").await.unwrap();
    assert!(outcome.allowed);
    assert_eq!(outcome.tokens, 1.0);
}

#[tokio::test]
async fn test_bucket_reset_refills() {
    let (limiter, _) = bucket(2, 0.1);
    limiter.allow_n("client", 2).await.unwrap();
    assert!(!limiter.allow("client").await.unwrap().allowed);

    limiter.reset("client").await.unwrap();
    assert!(limiter.allow("client").await.unwrap().allowed);
}

#[tokio::test]
async fn test_bucket_keys_are_independent() {
    let (limiter, _) = bucket(1, 0.1);
    assert!(limiter.allow("a").await.unwrap().allowed);
    assert!(!limiter.allow("a").await.unwrap().allowed);
    assert!(limiter.allow("b").await.unwrap().allowed);
}

#[tokio::test]
async fn test_bucket_decision_reports_retry_after() {
    let (limiter, _) = bucket(2, 2.0);
    limiter.check("client", 2).await.unwrap();
    let decision = limiter.check("client", 1).await.unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.limit, 2);
    assert_eq!(decision.remaining, 0);
    assert_eq!(decision.retry_after, Some(Duration::from_millis(500)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bucket_concurrent_callers_never_overdraw() {
    let (limiter, _) = bucket(25, 0.001);
    let limiter = Arc::new(limiter);

    let mut handles = Vec::new();
    for _ in 0..100 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter.allow("shared").await.unwrap().allowed
        }));
    }
    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 25);
}

// ==================== Sliding window ====================

#[tokio::test]
async fn test_window_exactness() {
    let (limiter, clock) = window(3, Duration::from_secs(1));

    for expected in 1..=3 {
        let outcome = limiter.allow("client").await.unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.count, expected);
    }
    let fourth = limiter.allow("client").await.unwrap();
    assert!(!fourth.allowed);
    assert_eq!(fourth.count, 3);

    clock.advance(Duration::from_millis(1_001));
    let after = limiter.allow("client").await.unwrap();
    assert!(after.allowed);
    assert_eq!(after.count, 1);
}

#[tokio::test]
async fn test_window_boundary_event_still_counts() {
    let (limiter, clock) = window(1, Duration::from_secs(1));
    assert!(limiter.allow("client").await.unwrap().allowed);

    // now - window == event timestamp: still inside the window.
    clock.advance(Duration::from_millis(1_000));
    assert!(!limiter.allow("client").await.unwrap().allowed);
    clock.advance(Duration::from_millis(1));
    assert!(limiter.allow("client").await.unwrap().allowed);
}

#[tokio::test]
async fn test_window_slides_gradually() {
    let (limiter, clock) = window(2, Duration::from_secs(10));
    limiter.allow("client").await.unwrap();
    clock.advance(Duration::from_secs(6));
    limiter.allow("client").await.unwrap();
    assert!(!limiter.allow("client").await.unwrap().allowed);

    // First event ages out; second is still inside.
    clock.advance(Duration::from_millis(4_001));
    assert_eq!(limiter.get_count("client").await.unwrap(), 1);
    assert!(limiter.allow("client").await.unwrap().allowed);
    assert!(!limiter.allow("client").await.unwrap().allowed);
}

#[tokio::test]
async fn test_window_get_count_and_reset() {
    let (limiter, _) = window(5, Duration::from_secs(60));
    for _ in 0..3 {
        limiter.allow("client").await.unwrap();
    }
    assert_eq!(limiter.get_count("client").await.unwrap(), 3);
    assert_eq!(limiter.remaining("client").await.unwrap(), 2);

    limiter.reset("client").await.unwrap();
    assert_eq!(limiter.get_count("client").await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_window_concurrent_callers_respect_limit() {
    let (limiter, _) = window(10, Duration::from_secs(60));
    let limiter = Arc::new(limiter);

    let mut handles = Vec::new();
    for _ in 0..50 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter.allow("shared").await.unwrap().allowed
        }));
    }
    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 10);
    assert_eq!(limiter.get_count("shared").await.unwrap(), 10);
}
