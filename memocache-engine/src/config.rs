use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::batch::BatchConfig;
use crate::breaker::CircuitBreakerConfig;
use crate::checksum::ChecksumConfig;
use crate::compression::CompressionConfig;
use crate::core::{CacheError, Result};
use crate::memory::MemoryPressureConfig;
use crate::storage::{AtomicWriteConfig, PartitionedStorageConfig};

/// Background worker tuning for batch and maintenance work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundWorkerConfig {
    /// Concurrency cap for batched operations
    pub max_workers: usize,
    /// Operations per batch chunk
    pub batch_size: usize,
    /// Cadence of the periodic maintenance tick (pool shrink)
    pub flush_interval_ms: u64,
}

impl Default for BackgroundWorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            batch_size: 100,
            flush_interval_ms: 30_000,
        }
    }
}

/// Top-level cache engine configuration.
///
/// Every option has an explicit default; `validate` rejects inconsistent
/// combinations before any component is constructed. The only silent
/// adjustment is compression level clamping, which is documented on
/// [`crate::compression::CompressionAlgorithm::clamp_level`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Disabled caches accept every call and store nothing
    pub enabled: bool,
    pub base_dir: PathBuf,
    /// Default TTL applied when `set` passes none (ms)
    pub default_ttl_ms: Option<u64>,
    /// Maximum serialized payload size accepted per entry (bytes)
    pub max_entry_bytes: usize,
    /// Entry cap for the in-memory LRU tier
    pub max_memory_entries: usize,
    pub compression: CompressionConfig,
    pub checksum: ChecksumConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub partitioned_storage: PartitionedStorageConfig,
    pub atomic_writes: AtomicWriteConfig,
    pub background_workers: BackgroundWorkerConfig,
    pub memory_pressure: MemoryPressureConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_dir: PathBuf::from("./data/cache"),
            default_ttl_ms: None,
            max_entry_bytes: 8 * 1024 * 1024,
            max_memory_entries: 10_000,
            compression: CompressionConfig::default(),
            checksum: ChecksumConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            partitioned_storage: PartitionedStorageConfig::default(),
            atomic_writes: AtomicWriteConfig::default(),
            background_workers: BackgroundWorkerConfig::default(),
            memory_pressure: MemoryPressureConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from a YAML file; unspecified options fall back to
    /// defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: CacheConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent option combinations
    pub fn validate(&self) -> Result<()> {
        if self.max_entry_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "max_entry_bytes must be positive".into(),
            ));
        }
        if self.max_memory_entries == 0 {
            return Err(CacheError::InvalidConfig(
                "max_memory_entries must be positive".into(),
            ));
        }

        let partitions = self.partitioned_storage.partitions;
        if self.partitioned_storage.enabled && !(1..=4096).contains(&partitions) {
            return Err(CacheError::InvalidConfig(format!(
                "partitions must be in 1..=4096, got {}",
                partitions
            )));
        }

        let breaker = &self.circuit_breaker;
        if breaker.enabled {
            if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
                return Err(CacheError::InvalidConfig(
                    "circuit breaker thresholds must be positive".into(),
                ));
            }
            if breaker.timeout_ms == 0 || breaker.monitoring_window_ms == 0 {
                return Err(CacheError::InvalidConfig(
                    "circuit breaker timeout and monitoring window must be positive".into(),
                ));
            }
        }

        let memory = &self.memory_pressure;
        if memory.warning_threshold <= 0.0 || memory.critical_threshold > 1.0 {
            return Err(CacheError::InvalidConfig(format!(
                "memory thresholds must lie in (0, 1], got warning={} critical={}",
                memory.warning_threshold, memory.critical_threshold
            )));
        }
        if memory.warning_threshold >= memory.critical_threshold {
            return Err(CacheError::InvalidConfig(format!(
                "warning threshold {} must be below critical threshold {}",
                memory.warning_threshold, memory.critical_threshold
            )));
        }
        if memory.monitoring_interval_ms == 0 || memory.max_memory_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "memory monitoring interval and ceiling must be positive".into(),
            ));
        }

        if self.compression.use_workers && self.compression.max_workers == 0 {
            return Err(CacheError::InvalidConfig(
                "compression.max_workers must be positive when workers are enabled".into(),
            ));
        }

        let workers = &self.background_workers;
        if workers.max_workers == 0 || workers.batch_size == 0 || workers.flush_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "background worker counts and flush interval must be positive".into(),
            ));
        }

        Ok(())
    }

    /// Batch processor settings derived from the background worker surface
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_concurrency: self.background_workers.max_workers,
            max_batch_size: self.background_workers.batch_size,
            ..BatchConfig::default()
        }
    }
}
