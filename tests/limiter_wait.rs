use chrono::{TimeDelta, Utc};
use quota_guard::RateLimiter;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn wait_is_immediate_under_quota() {
    let limiter = RateLimiter::new(3, Utc::now() + TimeDelta::seconds(5));
    let start = Instant::now();
    for _ in 0..3 {
        limiter.wait().await;
    }
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn wait_blocks_until_reset_once_quota_is_spent() {
    let limiter = RateLimiter::new(2, Utc::now() + TimeDelta::seconds(1));
    let start = Instant::now();
    for _ in 0..3 {
        limiter.wait().await;
    }
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_millis(800),
        "third wait returned too early: {:?}",
        elapsed
    );
    assert!(elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn wait_timeout_expires_when_quota_stays_exhausted() {
    let limiter = RateLimiter::new(0, Utc::now() + TimeDelta::seconds(60));
    let start = Instant::now();
    assert!(!limiter.wait_timeout(Duration::from_millis(200)).await);
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn wait_timeout_admits_under_quota() {
    let limiter = RateLimiter::new(1, Utc::now() + TimeDelta::seconds(60));
    assert!(limiter.wait_timeout(Duration::from_millis(200)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquires_never_exceed_limit() {
    let limiter = Arc::new(RateLimiter::new(10, Utc::now() + TimeDelta::seconds(60)));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            let mut admitted = 0usize;
            for _ in 0..10 {
                if limiter.try_acquire().is_admitted() {
                    admitted += 1;
                }
            }
            admitted
        }));
    }
    let mut total = 0;
    for h in handles {
        total += h.await.unwrap();
    }
    assert_eq!(total, 10);
}
