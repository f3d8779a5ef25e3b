//! Batch Processor
//!
//! Executes collections of cache operations under bounded concurrency with
//! per-operation timeouts and exponential-backoff retries. The semaphore is
//! the engine's only explicit backpressure mechanism.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::core::{BatchOperation, BatchResult, CacheError, Result};

/// Batch processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum operations in flight at once
    pub max_concurrency: usize,
    /// Operations per chunk
    pub max_batch_size: usize,
    /// Per-operation timeout (ms)
    pub op_timeout_ms: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff (ms)
    pub retry_base_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_batch_size: 100,
            op_timeout_ms: 5_000,
            max_retries: 2,
            retry_base_delay_ms: 25,
        }
    }
}

/// Cumulative statistics across `process` calls
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub batches: u64,
    pub operations: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total_duration_ms: u64,
    pub avg_latency_ms: f64,
    pub throughput_ops_per_sec: f64,
}

struct StatsInner {
    batches: u64,
    operations: u64,
    succeeded: u64,
    failed: u64,
    total_duration_ms: u64,
    latency_sum_ms: u64,
}

/// Bounded-concurrency executor for batched cache operations
pub struct BatchProcessor {
    config: BatchConfig,
    stats: Mutex<StatsInner>,
}

impl BatchProcessor {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(StatsInner {
                batches: 0,
                operations: 0,
                succeeded: 0,
                failed: 0,
                total_duration_ms: 0,
                latency_sum_ms: 0,
            }),
        }
    }

    /// Run every operation through `executor`. Item failures are isolated in
    /// their own `BatchResult`; results preserve input order.
    pub async fn process<F, Fut>(
        &self,
        operations: Vec<BatchOperation>,
        executor: F,
    ) -> Vec<BatchResult>
    where
        F: Fn(BatchOperation) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<serde_json::Value>>> + Send + 'static,
    {
        let started = Instant::now();
        let total = operations.len();
        let mut results = Vec::with_capacity(total);

        let chunk_size = self.config.max_batch_size.max(1);
        let mut remaining = operations;
        while !remaining.is_empty() {
            let rest = remaining.split_off(chunk_size.min(remaining.len()));
            let chunk = std::mem::replace(&mut remaining, rest);
            debug!("Processing batch chunk of {} operations", chunk.len());

            let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
            let mut handles = Vec::with_capacity(chunk.len());
            for op in chunk {
                let key = op.key().to_string();
                let semaphore = semaphore.clone();
                let executor = executor.clone();
                let config = self.config.clone();
                let handle = tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    Self::run_one(op, executor, &config).await
                });
                handles.push((key, handle));
            }

            for (key, handle) in handles {
                match handle.await {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        warn!("Batch task for '{}' panicked: {}", key, e);
                        results.push(BatchResult {
                            key,
                            success: false,
                            data: None,
                            error: Some(format!("task failed: {}", e)),
                            duration_ms: 0,
                        });
                    }
                }
            }
        }

        self.record(&results, started.elapsed());
        results
    }

    async fn run_one<F, Fut>(op: BatchOperation, executor: F, config: &BatchConfig) -> BatchResult
    where
        F: Fn(BatchOperation) -> Fut,
        Fut: Future<Output = Result<Option<serde_json::Value>>>,
    {
        let started = Instant::now();
        let key = op.key().to_string();
        let timeout = Duration::from_millis(config.op_timeout_ms);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match tokio::time::timeout(timeout, executor(op.clone())).await {
                Ok(Ok(data)) => {
                    return BatchResult {
                        key,
                        success: true,
                        data,
                        error: None,
                        duration_ms: started.elapsed().as_millis() as u64,
                    };
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => CacheError::Timeout(config.op_timeout_ms).to_string(),
            };

            if attempt > config.max_retries {
                return BatchResult {
                    key,
                    success: false,
                    data: None,
                    error: Some(error),
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }

            let delay = config.retry_base_delay_ms << (attempt - 1);
            debug!(
                "Batch op '{}' failed ({}), retry {}/{} in {}ms",
                key, error, attempt, config.max_retries, delay
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn record(&self, results: &[BatchResult], elapsed: Duration) {
        let mut stats = self.stats.lock();
        stats.batches += 1;
        stats.operations += results.len() as u64;
        stats.succeeded += results.iter().filter(|r| r.success).count() as u64;
        stats.failed += results.iter().filter(|r| !r.success).count() as u64;
        stats.total_duration_ms += elapsed.as_millis() as u64;
        stats.latency_sum_ms += results.iter().map(|r| r.duration_ms).sum::<u64>();
    }

    pub fn stats(&self) -> BatchStats {
        let stats = self.stats.lock();
        BatchStats {
            batches: stats.batches,
            operations: stats.operations,
            succeeded: stats.succeeded,
            failed: stats.failed,
            total_duration_ms: stats.total_duration_ms,
            avg_latency_ms: if stats.operations > 0 {
                stats.latency_sum_ms as f64 / stats.operations as f64
            } else {
                0.0
            },
            throughput_ops_per_sec: if stats.total_duration_ms > 0 {
                stats.operations as f64 / (stats.total_duration_ms as f64 / 1000.0)
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn get_op(key: &str) -> BatchOperation {
        BatchOperation::Get {
            key: key.to_string(),
            input_hash: None,
        }
    }

    #[tokio::test]
    async fn test_results_preserve_order() {
        let processor = BatchProcessor::new(BatchConfig::default());
        let ops: Vec<_> = (0..10).map(|i| get_op(&format!("k{}", i))).collect();

        let results = processor
            .process(ops, |op| async move {
                Ok(Some(json!({ "key": op.key().to_string() })))
            })
            .await;

        assert_eq!(results.len(), 10);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.key, format!("k{}", i));
            assert!(r.success);
        }
    }

    #[tokio::test]
    async fn test_item_failures_are_isolated() {
        let processor = BatchProcessor::new(BatchConfig {
            max_retries: 0,
            ..Default::default()
        });
        let ops = vec![get_op("good"), get_op("bad"), get_op("good2")];

        let results = processor
            .process(ops, |op| async move {
                if op.key() == "bad" {
                    Err(CacheError::Internal("broken".into()))
                } else {
                    Ok(None)
                }
            })
            .await;

        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.as_deref().unwrap().contains("broken"));
        assert!(results[2].success);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let processor = BatchProcessor::new(BatchConfig {
            max_retries: 3,
            retry_base_delay_ms: 1,
            ..Default::default()
        });

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let results = processor
            .process(vec![get_op("flaky")], move |_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CacheError::Internal("transient".into()))
                    } else {
                        Ok(None)
                    }
                }
            })
            .await;

        assert!(results[0].success);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_per_operation_timeout() {
        let processor = BatchProcessor::new(BatchConfig {
            op_timeout_ms: 20,
            max_retries: 0,
            ..Default::default()
        });

        let results = processor
            .process(vec![get_op("slow")], |_| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(None)
            })
            .await;

        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let processor = BatchProcessor::new(BatchConfig {
            max_retries: 0,
            ..Default::default()
        });

        processor
            .process(vec![get_op("a"), get_op("b")], |_| async { Ok(None) })
            .await;
        processor
            .process(vec![get_op("c")], |_| async {
                Err(CacheError::Internal("x".into()))
            })
            .await;

        let stats = processor.stats();
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.operations, 3);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
    }
}
