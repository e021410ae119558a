//! Burst admission through the per-user cooldown gate

use media_relay_bot::downloader::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[test]
fn test_burst_from_one_user_admits_exactly_one() {
    let limiter = RateLimiter::new(Duration::from_secs(3));
    let t0 = Instant::now();

    let admitted = (0..5).filter(|_| limiter.admit_at(42, t0)).count();
    assert_eq!(admitted, 1);

    // Still inside the window
    assert!(!limiter.admit_at(42, t0 + Duration::from_millis(2999)));
    // Window elapsed
    assert!(limiter.admit_at(42, t0 + Duration::from_secs(3)));
}

#[test]
fn test_rejections_do_not_extend_the_window() {
    let limiter = RateLimiter::new(Duration::from_secs(3));
    let t0 = Instant::now();

    assert!(limiter.admit_at(1, t0));
    for ms in [500, 1000, 2000, 2900] {
        assert!(!limiter.admit_at(1, t0 + Duration::from_millis(ms)));
    }
    assert!(limiter.admit_at(1, t0 + Duration::from_secs(3)));
}

#[test]
fn test_users_are_independent() {
    let limiter = RateLimiter::new(Duration::from_secs(3));
    let t0 = Instant::now();

    assert!(limiter.admit_at(1, t0));
    assert!(limiter.admit_at(2, t0));
    assert!(!limiter.admit_at(1, t0));
    assert_eq!(limiter.tracked_users(), 2);
}

#[test]
fn test_exempt_users_always_pass() {
    let limiter = RateLimiter::new(Duration::from_secs(60)).with_exempt([99]);
    let t0 = Instant::now();

    assert!((0..10).all(|_| limiter.admit_at(99, t0)));
    assert_eq!(limiter.tracked_users(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_burst_admits_one() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60)));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.admit(7) })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
}
