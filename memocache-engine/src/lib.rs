pub mod batch;
pub mod breaker;
pub mod checksum;
pub mod compression;
pub mod config;
pub mod core;
pub mod manager;
pub mod memory;
pub mod pool;
pub mod storage;

// Re-export commonly used types
pub use batch::{BatchConfig, BatchProcessor, BatchStats};
pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use checksum::{ChecksumConfig, ChecksumValidator, ValidationDetails, ValidationReport};
pub use compression::{
    CompressionAlgorithm, CompressionConfig, Compressor, InlineCompressor, PooledCompressor,
};
pub use config::{BackgroundWorkerConfig, CacheConfig};
pub use core::{
    BatchOperation, BatchResult, CacheEntry, CacheError, CacheEvent, ChecksumAlgorithm,
    ChecksumResult, EventSink, MemoryStats, PressureLevel, Result,
};
pub use manager::{CacheManager, CacheManagerBuilder, CacheStats, VerifyReport};
pub use memory::{
    EvictionOutcome, EvictionStrategy, MemoryMonitor, MemoryPressureConfig, MemorySampler,
    SystemMemorySampler,
};
pub use pool::{BufferPool, BufferPoolStats, ObjectPool, PoolStats};
pub use storage::{
    AtomicFile, AtomicWriteConfig, PartitionInfo, PartitionedStorageConfig, PartitionedStore,
};
