//! Circuit Breaker
//!
//! Wraps filesystem-facing calls with failure-threshold fail-fast and timed
//! recovery probing, isolating cascading disk errors from cache operations.
//! Failures are counted within a sliding monitoring window, not over the
//! breaker's lifetime.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::core::{CacheError, Result};

/// Breaker state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Operations execute normally
    Closed,
    /// Operations are rejected until the timeout elapses
    Open,
    /// Trial operations probe whether the dependency recovered
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Failures within the monitoring window before the circuit opens
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the circuit closes
    pub success_threshold: u32,
    /// How long the circuit stays open before probing (ms)
    pub timeout_ms: u64,
    /// Sliding window for failure counting (ms)
    pub monitoring_window_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            timeout_ms: 30_000,
            monitoring_window_ms: 60_000,
        }
    }
}

/// Point-in-time breaker counters
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub recent_failures: usize,
    pub consecutive_successes: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub rejected: u64,
    pub next_attempt_in_ms: Option<u64>,
}

struct BreakerInner {
    state: CircuitState,
    recent_failures: VecDeque<Instant>,
    consecutive_successes: u32,
    next_attempt: Option<Instant>,
    total_requests: u64,
    total_failures: u64,
    total_successes: u64,
    rejected: u64,
}

/// Failure-isolating wrapper for async operations
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                recent_failures: VecDeque::new(),
                consecutive_successes: 0,
                next_attempt: None,
                total_requests: 0,
                total_failures: 0,
                total_successes: 0,
                rejected: 0,
            }),
        }
    }

    /// Run `f` under breaker protection. When the circuit is open the
    /// future is never constructed and a `CircuitOpen` error is returned
    /// immediately.
    pub async fn call<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.config.enabled {
            return f().await;
        }

        self.admit(operation)?;
        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure(operation);
                Err(e)
            }
        }
    }

    fn admit(&self, operation: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.total_requests += 1;

        if inner.state == CircuitState::Open {
            let now = Instant::now();
            match inner.next_attempt {
                Some(at) if now >= at => {
                    info!("Circuit '{}' probing: OPEN -> HALF_OPEN", self.name);
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                }
                _ => {
                    inner.rejected += 1;
                    let retry_after_ms = inner
                        .next_attempt
                        .map(|at| at.saturating_duration_since(now).as_millis() as u64)
                        .unwrap_or(self.config.timeout_ms);
                    return Err(CacheError::CircuitOpen {
                        operation: operation.to_string(),
                        retry_after_ms,
                    });
                }
            }
        }
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_successes += 1;

        match inner.state {
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    info!("Circuit '{}' recovered: HALF_OPEN -> CLOSED", self.name);
                    inner.state = CircuitState::Closed;
                    inner.recent_failures.clear();
                    inner.next_attempt = None;
                }
            }
            CircuitState::Closed => {
                // A success clears the failure window
                inner.recent_failures.clear();
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, operation: &str) {
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        let now = Instant::now();

        match inner.state {
            CircuitState::HalfOpen => {
                warn!(
                    "Circuit '{}' re-opened after half-open failure in {}",
                    self.name, operation
                );
                inner.state = CircuitState::Open;
                inner.next_attempt = Some(now + Duration::from_millis(self.config.timeout_ms));
                inner.consecutive_successes = 0;
            }
            CircuitState::Closed => {
                inner.recent_failures.push_back(now);
                let window = Duration::from_millis(self.config.monitoring_window_ms);
                while let Some(front) = inner.recent_failures.front() {
                    if now.duration_since(*front) > window {
                        inner.recent_failures.pop_front();
                    } else {
                        break;
                    }
                }
                debug!(
                    "Circuit '{}': {} failures in window (threshold {})",
                    self.name,
                    inner.recent_failures.len(),
                    self.config.failure_threshold
                );
                if inner.recent_failures.len() >= self.config.failure_threshold as usize {
                    warn!(
                        "Circuit '{}' opened after {} failures in {}",
                        self.name,
                        inner.recent_failures.len(),
                        operation
                    );
                    inner.state = CircuitState::Open;
                    inner.next_attempt = Some(now + Duration::from_millis(self.config.timeout_ms));
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        let now = Instant::now();
        CircuitBreakerStats {
            state: inner.state,
            recent_failures: inner.recent_failures.len(),
            consecutive_successes: inner.consecutive_successes,
            total_requests: inner.total_requests,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            rejected: inner.rejected,
            next_attempt_in_ms: inner
                .next_attempt
                .map(|at| at.saturating_duration_since(now).as_millis() as u64),
        }
    }

    /// Force the breaker back to CLOSED with cleared counters
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.recent_failures.clear();
        inner.consecutive_successes = 0;
        inner.next_attempt = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 3,
            success_threshold: 2,
            timeout_ms: 50,
            monitoring_window_ms: 10_000,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<()> {
        breaker
            .call("test", || async {
                Err::<(), _>(CacheError::Internal("boom".into()))
            })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<()> {
        breaker.call("test", || async { Ok(()) }).await
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new("t", quick_config());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_open_rejects_without_executing() {
        let breaker = CircuitBreaker::new("t", quick_config());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }

        let executed = AtomicUsize::new(0);
        let result = breaker
            .call("probe", || async {
                executed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(CacheError::CircuitOpen { .. })));
        assert_eq!(executed.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("t", quick_config());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }

        tokio::time::sleep(Duration::from_millis(60)).await;
        // Next call probes in HALF_OPEN; its failure re-opens the circuit
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = succeed(&breaker).await;
        assert!(matches!(result, Err(CacheError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn test_recovery_after_consecutive_successes() {
        let breaker = CircuitBreaker::new("t", quick_config());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }

        tokio::time::sleep(Duration::from_millis(60)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_success_clears_failure_window() {
        let breaker = CircuitBreaker::new("t", quick_config());
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        succeed(&breaker).await.unwrap();
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        // Only two failures since the success; threshold is three
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_window_prunes_old_failures() {
        let config = CircuitBreakerConfig {
            monitoring_window_ms: 30,
            ..quick_config()
        };
        let breaker = CircuitBreaker::new("t", config);

        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        // Old failures fall outside the window; this one alone cannot trip
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_disabled_breaker_passes_through() {
        let breaker = CircuitBreaker::new(
            "t",
            CircuitBreakerConfig {
                enabled: false,
                failure_threshold: 1,
                ..quick_config()
            },
        );
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        succeed(&breaker).await.unwrap();
    }
}
