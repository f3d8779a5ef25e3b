use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::compressor::{
    CompressionAlgorithm, CompressionOutcome, CompressionTotals, Compressor, DecompressionOutcome,
    InlineCompressor,
};
use crate::core::Result;

/// Compressor that offloads large payloads to a bounded blocking pool.
///
/// Payloads below `worker_threshold` run inline. When every worker permit is
/// taken, or the offloaded task fails to complete, the call falls back to the
/// inline path - worker availability affects latency, never correctness.
pub struct PooledCompressor {
    inner: Arc<InlineCompressor>,
    permits: Arc<Semaphore>,
    worker_threshold: usize,
}

impl PooledCompressor {
    pub fn new(inner: Arc<InlineCompressor>) -> Self {
        let config = inner.config();
        let max_workers = config.max_workers.max(1);
        let worker_threshold = config.worker_threshold;
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_workers)),
            worker_threshold,
        }
    }

    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    async fn offload<F, T>(&self, job: F, fallback: impl FnOnce() -> Result<T>) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                let handle = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    job()
                });
                match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Compression worker failed ({}), running inline", e);
                        fallback()
                    }
                }
            }
            Err(_) => {
                debug!("Compression pool saturated, running inline");
                fallback()
            }
        }
    }
}

#[async_trait]
impl Compressor for PooledCompressor {
    async fn compress(&self, data: &[u8]) -> Result<CompressionOutcome> {
        if data.len() < self.worker_threshold {
            return self.inner.compress_sync(data);
        }
        let inner = self.inner.clone();
        let owned = data.to_vec();
        self.offload(move || inner.compress_sync(&owned), || {
            self.inner.compress_sync(data)
        })
        .await
    }

    async fn decompress(
        &self,
        data: &[u8],
        algorithm: CompressionAlgorithm,
    ) -> Result<DecompressionOutcome> {
        if data.len() < self.worker_threshold {
            return self.inner.decompress_sync(data, algorithm);
        }
        let inner = self.inner.clone();
        let owned = data.to_vec();
        self.offload(
            move || inner.decompress_sync(&owned, algorithm),
            || self.inner.decompress_sync(data, algorithm),
        )
        .await
    }

    fn should_compress(&self, payload_size: usize) -> bool {
        self.inner.should_compress(payload_size)
    }

    fn algorithm(&self) -> CompressionAlgorithm {
        self.inner.config().algorithm
    }

    fn totals(&self) -> CompressionTotals {
        self.inner.totals()
    }
}
