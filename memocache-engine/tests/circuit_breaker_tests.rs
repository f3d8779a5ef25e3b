//! Circuit breaker behavior under sustained and recovering failure

use memocache_engine::core::CacheError;
use memocache_engine::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

fn config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        enabled: true,
        failure_threshold: 4,
        success_threshold: 2,
        timeout_ms: 80,
        monitoring_window_ms: 10_000,
    }
}

async fn failing_io(breaker: &CircuitBreaker, attempts: &AtomicUsize) -> Result<(), CacheError> {
    breaker
        .call("disk_write", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(CacheError::Io(std::io::Error::other("disk full")))
        })
        .await
}

#[tokio::test]
async fn test_fail_fast_after_threshold_without_io() {
    let breaker = CircuitBreaker::new("disk", config());
    let attempts = AtomicUsize::new(0);

    for _ in 0..4 {
        let _ = failing_io(&breaker, &attempts).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(attempts.load(Ordering::SeqCst), 4);

    // Twenty more calls are rejected instantly, none reach the I/O path
    let started = Instant::now();
    for _ in 0..20 {
        let result = failing_io(&breaker, &attempts).await;
        assert!(matches!(result, Err(CacheError::CircuitOpen { .. })));
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert!(
        started.elapsed() < Duration::from_millis(50),
        "rejections must not wait on the failing dependency"
    );
    assert_eq!(breaker.stats().rejected, 20);
}

#[tokio::test]
async fn test_single_half_open_failure_reopens() {
    let breaker = CircuitBreaker::new("disk", config());
    let attempts = AtomicUsize::new(0);

    for _ in 0..4 {
        let _ = failing_io(&breaker, &attempts).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The probe executes (HALF_OPEN) and its failure re-opens the circuit
    let _ = failing_io(&breaker, &attempts).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 5);
    assert_eq!(breaker.state(), CircuitState::Open);

    // Back to fail-fast
    let result = failing_io(&breaker, &attempts).await;
    assert!(matches!(result, Err(CacheError::CircuitOpen { .. })));
    assert_eq!(attempts.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_full_recovery_cycle() {
    let breaker = CircuitBreaker::new("disk", config());
    let attempts = AtomicUsize::new(0);

    for _ in 0..4 {
        let _ = failing_io(&breaker, &attempts).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Two consecutive successes close the circuit
    breaker.call("disk_write", || async { Ok(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    breaker.call("disk_write", || async { Ok(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);

    // The failure window restarts from scratch after recovery
    for _ in 0..3 {
        let _ = failing_io(&breaker, &attempts).await;
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_concurrent_callers_share_breaker_state() {
    let breaker = Arc::new(CircuitBreaker::new("disk", config()));
    let attempts = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let breaker = breaker.clone();
        let attempts = attempts.clone();
        handles.push(tokio::spawn(async move {
            failing_io(&breaker, &attempts).await
        }));
    }
    for handle in handles {
        let _ = handle.await.unwrap();
    }

    assert_eq!(breaker.state(), CircuitState::Open);
    let stats = breaker.stats();
    assert_eq!(stats.total_requests, 8);
    // At least the threshold's worth of calls actually executed; later ones
    // may have been rejected
    assert!(attempts.load(Ordering::SeqCst) >= 4);
    assert_eq!(
        stats.total_failures + stats.rejected,
        8,
        "every call either executed and failed or was rejected"
    );
}
