use async_trait::async_trait;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

use crate::core::{CacheError, Result};

/// Compression algorithm selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// No compression
    None,
    /// Gzip - matches the `.json.gz` on-disk layout (default)
    #[default]
    Gzip,
    /// LZ4 - fast compression/decompression
    Lz4,
    /// Zstandard - better compression ratio
    Zstd,
}

impl CompressionAlgorithm {
    /// File extension appended to compressed entry files
    pub fn file_extension(&self) -> Option<&'static str> {
        match self {
            CompressionAlgorithm::None => None,
            CompressionAlgorithm::Gzip => Some("gz"),
            CompressionAlgorithm::Lz4 => Some("lz4"),
            CompressionAlgorithm::Zstd => Some("zst"),
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "gz" => Some(CompressionAlgorithm::Gzip),
            "lz4" => Some(CompressionAlgorithm::Lz4),
            "zst" => Some(CompressionAlgorithm::Zstd),
            _ => None,
        }
    }

    /// Clamp a level into the valid range of this algorithm
    pub fn clamp_level(&self, level: i32) -> i32 {
        match self {
            CompressionAlgorithm::None => level,
            CompressionAlgorithm::Gzip => level.clamp(0, 9),
            CompressionAlgorithm::Lz4 => level.clamp(0, 16),
            CompressionAlgorithm::Zstd => level.clamp(1, 22),
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Enable compression globally
    pub enabled: bool,
    /// Algorithm for new entries
    pub algorithm: CompressionAlgorithm,
    /// Compression level; clamped to the algorithm's valid range
    pub level: i32,
    /// Minimum payload size to compress (bytes)
    pub min_payload_size: usize,
    /// Offload to a blocking worker pool
    pub use_workers: bool,
    /// Maximum concurrent offload workers
    pub max_workers: usize,
    /// Payloads at or above this size are offloaded (bytes)
    pub worker_threshold: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: CompressionAlgorithm::Gzip,
            level: 6,
            min_payload_size: 1024, // Don't compress < 1KB
            use_workers: true,
            max_workers: 2,
            worker_threshold: 64 * 1024,
        }
    }
}

/// Result of one compression call
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub data: Vec<u8>,
    pub original_size: usize,
    pub compressed_size: usize,
    pub ratio: f64,
    pub duration_ms: u64,
}

/// Result of one decompression call
#[derive(Debug, Clone)]
pub struct DecompressionOutcome {
    pub data: Vec<u8>,
    pub compressed_size: usize,
    pub decompressed_size: usize,
    pub duration_ms: u64,
}

/// Cumulative compression statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompressionTotals {
    pub operations: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// bytes_in / bytes_out across all operations
    pub overall_ratio: f64,
}

/// Compression interface. Correctness never depends on which implementation
/// backs it, only latency does.
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(&self, data: &[u8]) -> Result<CompressionOutcome>;
    async fn decompress(
        &self,
        data: &[u8],
        algorithm: CompressionAlgorithm,
    ) -> Result<DecompressionOutcome>;
    /// Whether a payload of this size is worth compressing
    fn should_compress(&self, payload_size: usize) -> bool;
    fn algorithm(&self) -> CompressionAlgorithm;
    fn totals(&self) -> CompressionTotals;
}

/// Synchronous compressor running on the calling task
pub struct InlineCompressor {
    config: CompressionConfig,
    level: i32,
    operations: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl InlineCompressor {
    pub fn new(config: CompressionConfig) -> Self {
        let level = config.algorithm.clamp_level(config.level);
        if level != config.level {
            debug!(
                "Compression level {} clamped to {} for {:?}",
                config.level, level, config.algorithm
            );
        }
        Self {
            config,
            level,
            operations: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub(crate) fn compress_sync(&self, data: &[u8]) -> Result<CompressionOutcome> {
        let start = Instant::now();
        let compressed = match self.config.algorithm {
            CompressionAlgorithm::None => data.to_vec(),
            CompressionAlgorithm::Gzip => self.compress_gzip(data)?,
            CompressionAlgorithm::Lz4 => self.compress_lz4(data)?,
            CompressionAlgorithm::Zstd => self.compress_zstd(data)?,
        };

        self.operations.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(data.len() as u64, Ordering::Relaxed);
        self.bytes_out
            .fetch_add(compressed.len() as u64, Ordering::Relaxed);

        let ratio = if compressed.is_empty() {
            1.0
        } else {
            data.len() as f64 / compressed.len() as f64
        };
        debug!(
            "{:?} compressed: {} → {} bytes (ratio: {:.2}x)",
            self.config.algorithm,
            data.len(),
            compressed.len(),
            ratio
        );

        Ok(CompressionOutcome {
            original_size: data.len(),
            compressed_size: compressed.len(),
            ratio,
            duration_ms: start.elapsed().as_millis() as u64,
            data: compressed,
        })
    }

    pub(crate) fn decompress_sync(
        &self,
        data: &[u8],
        algorithm: CompressionAlgorithm,
    ) -> Result<DecompressionOutcome> {
        let start = Instant::now();
        let decompressed = match algorithm {
            CompressionAlgorithm::None => data.to_vec(),
            CompressionAlgorithm::Gzip => self.decompress_gzip(data)?,
            CompressionAlgorithm::Lz4 => self.decompress_lz4(data)?,
            CompressionAlgorithm::Zstd => self.decompress_zstd(data)?,
        };

        debug!(
            "{:?} decompressed: {} → {} bytes",
            algorithm,
            data.len(),
            decompressed.len()
        );

        Ok(DecompressionOutcome {
            compressed_size: data.len(),
            decompressed_size: decompressed.len(),
            duration_ms: start.elapsed().as_millis() as u64,
            data: decompressed,
        })
    }

    fn compress_gzip(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level as u32));
        encoder
            .write_all(data)
            .map_err(|e| CacheError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CacheError::Compression(e.to_string()))
    }

    fn decompress_gzip(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| CacheError::Compression(e.to_string()))?;
        Ok(decompressed)
    }

    fn compress_lz4(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = lz4::EncoderBuilder::new()
            .level(self.level as u32)
            .build(Vec::new())
            .map_err(|e| CacheError::Compression(e.to_string()))?;

        encoder
            .write_all(data)
            .map_err(|e| CacheError::Compression(e.to_string()))?;
        let (compressed, result) = encoder.finish();
        result.map_err(|e| CacheError::Compression(e.to_string()))?;
        Ok(compressed)
    }

    fn decompress_lz4(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder =
            lz4::Decoder::new(data).map_err(|e| CacheError::Compression(e.to_string()))?;
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| CacheError::Compression(e.to_string()))?;
        Ok(decompressed)
    }

    fn compress_zstd(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::encode_all(data, self.level).map_err(|e| CacheError::Compression(e.to_string()))
    }

    fn decompress_zstd(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| CacheError::Compression(e.to_string()))
    }
}

#[async_trait]
impl Compressor for InlineCompressor {
    async fn compress(&self, data: &[u8]) -> Result<CompressionOutcome> {
        self.compress_sync(data)
    }

    async fn decompress(
        &self,
        data: &[u8],
        algorithm: CompressionAlgorithm,
    ) -> Result<DecompressionOutcome> {
        self.decompress_sync(data, algorithm)
    }

    fn should_compress(&self, payload_size: usize) -> bool {
        self.config.enabled
            && self.config.algorithm != CompressionAlgorithm::None
            && payload_size >= self.config.min_payload_size
    }

    fn algorithm(&self) -> CompressionAlgorithm {
        self.config.algorithm
    }

    fn totals(&self) -> CompressionTotals {
        let bytes_in = self.bytes_in.load(Ordering::Relaxed);
        let bytes_out = self.bytes_out.load(Ordering::Relaxed);
        CompressionTotals {
            operations: self.operations.load(Ordering::Relaxed),
            bytes_in,
            bytes_out,
            overall_ratio: if bytes_out > 0 {
                bytes_in as f64 / bytes_out as f64
            } else {
                1.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressor(algorithm: CompressionAlgorithm) -> InlineCompressor {
        InlineCompressor::new(CompressionConfig {
            algorithm,
            min_payload_size: 10,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_gzip_roundtrip() {
        let c = compressor(CompressionAlgorithm::Gzip);
        let data = b"A payload that should compress well. ".repeat(20);

        let compressed = c.compress(&data).await.unwrap();
        assert!(compressed.compressed_size < data.len());
        assert_eq!(compressed.original_size, data.len());

        let decompressed = c
            .decompress(&compressed.data, CompressionAlgorithm::Gzip)
            .await
            .unwrap();
        assert_eq!(decompressed.data, data);
    }

    #[tokio::test]
    async fn test_lz4_roundtrip() {
        let c = compressor(CompressionAlgorithm::Lz4);
        let data = b"lz4 payload lz4 payload lz4 payload ".repeat(20);

        let compressed = c.compress(&data).await.unwrap();
        let decompressed = c
            .decompress(&compressed.data, CompressionAlgorithm::Lz4)
            .await
            .unwrap();
        assert_eq!(decompressed.data, data);
    }

    #[tokio::test]
    async fn test_zstd_roundtrip() {
        let c = compressor(CompressionAlgorithm::Zstd);
        let data = b"zstd payload zstd payload zstd payload ".repeat(20);

        let compressed = c.compress(&data).await.unwrap();
        assert!(compressed.compressed_size < data.len());

        let decompressed = c
            .decompress(&compressed.data, CompressionAlgorithm::Zstd)
            .await
            .unwrap();
        assert_eq!(decompressed.data, data);
    }

    #[test]
    fn test_level_clamping() {
        assert_eq!(CompressionAlgorithm::Gzip.clamp_level(99), 9);
        assert_eq!(CompressionAlgorithm::Gzip.clamp_level(-1), 0);
        assert_eq!(CompressionAlgorithm::Zstd.clamp_level(0), 1);
        assert_eq!(CompressionAlgorithm::Zstd.clamp_level(40), 22);
        assert_eq!(CompressionAlgorithm::Lz4.clamp_level(5), 5);
    }

    #[test]
    fn test_should_compress_threshold() {
        let c = InlineCompressor::new(CompressionConfig {
            min_payload_size: 1024,
            ..Default::default()
        });
        assert!(c.should_compress(2048));
        assert!(!c.should_compress(512));

        let disabled = InlineCompressor::new(CompressionConfig {
            enabled: false,
            ..Default::default()
        });
        assert!(!disabled.should_compress(1 << 20));
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(CompressionAlgorithm::Gzip.file_extension(), Some("gz"));
        assert_eq!(CompressionAlgorithm::None.file_extension(), None);
        assert_eq!(
            CompressionAlgorithm::from_extension("zst"),
            Some(CompressionAlgorithm::Zstd)
        );
        assert_eq!(CompressionAlgorithm::from_extension("json"), None);
    }

    #[tokio::test]
    async fn test_totals_accumulate() {
        let c = compressor(CompressionAlgorithm::Gzip);
        let data = b"repeat repeat repeat repeat ".repeat(50);
        c.compress(&data).await.unwrap();
        c.compress(&data).await.unwrap();

        let totals = c.totals();
        assert_eq!(totals.operations, 2);
        assert_eq!(totals.bytes_in, (data.len() * 2) as u64);
        assert!(totals.overall_ratio > 1.0);
    }
}
