//! Cache Manager
//!
//! Orchestrates the memory tier, partitioned disk tier, compression,
//! checksums, circuit breaker, memory pressure monitoring, and batch
//! processing behind the public get/set/delete/has API.
//!
//! Reads check the memory tier first; on miss the disk path is resolved via
//! partitioned storage and executed through the circuit breaker, then
//! decompressed, integrity-checked, and promoted into the memory tier.
//! Writes land in the memory tier immediately and persist atomically. Disk
//! failures degrade the cache to memory-only behavior; they are never
//! surfaced to callers as errors.

pub mod lru;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::batch::{BatchProcessor, BatchStats};
use crate::breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::checksum::ChecksumValidator;
use crate::compression::{CompressionAlgorithm, CompressionTotals, Compressor, InlineCompressor, PooledCompressor};
use crate::config::CacheConfig;
use crate::core::{
    BatchOperation, BatchResult, CacheEntry, CacheError, CacheEvent, EventSink, PressureLevel,
    Result, now_millis,
};
use crate::memory::{
    EvictionOutcome, EvictionStrategy, MemoryMonitor, MemorySampler, SystemMemorySampler,
};
use crate::pool::{BufferPool, BufferPoolStats};
use crate::storage::{AtomicFile, PartitionInfo, PartitionedStore};

pub use lru::{MemoryTier, MemoryTierStats, TierLookup};

/// Backups left behind by interrupted writes are pruned after this long
const BACKUP_GRACE_MS: u64 = 24 * 60 * 60 * 1000;

/// Read candidates, plain variant first
const READ_CANDIDATES: [CompressionAlgorithm; 4] = [
    CompressionAlgorithm::None,
    CompressionAlgorithm::Gzip,
    CompressionAlgorithm::Lz4,
    CompressionAlgorithm::Zstd,
];

/// Aggregated snapshot for external stats consumers
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub memory_entries: usize,
    pub memory_bytes: usize,
    pub max_memory_entries: usize,
    pub evictions: u64,
    pub expirations: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
    pub invalidated: u64,
    pub rejected_oversize: u64,
    pub compression: CompressionTotals,
    pub buffers: BufferPoolStats,
    pub breaker: CircuitBreakerStats,
    pub batch: BatchStats,
    pub pressure: PressureLevel,
}

/// Result of a `verify` maintenance scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub scanned: usize,
    pub valid: usize,
    pub expired: usize,
    pub corrupt: usize,
    pub removed: usize,
    pub bytes_reclaimed: u64,
}

struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
    invalidated: AtomicU64,
    rejected_oversize: AtomicU64,
}

/// Pressure-driven eviction of the LRU memory tier
struct MemoryTierStrategy {
    tier: Arc<MemoryTier>,
}

impl EvictionStrategy for MemoryTierStrategy {
    fn name(&self) -> &str {
        "memory-tier-lru"
    }

    fn evict(&self, level: PressureLevel, _stats: &crate::core::MemoryStats) -> EvictionOutcome {
        let fraction = match level {
            PressureLevel::Critical => 0.5,
            _ => 0.25,
        };
        let (items_evicted, bytes_freed) = self.tier.evict_fraction(fraction);
        EvictionOutcome {
            items_evicted,
            bytes_freed,
        }
    }
}

/// Buffer-pool release under pressure
struct BufferPoolStrategy {
    buffers: Arc<BufferPool>,
}

impl EvictionStrategy for BufferPoolStrategy {
    fn name(&self) -> &str {
        "buffer-pool"
    }

    fn evict(&self, _level: PressureLevel, _stats: &crate::core::MemoryStats) -> EvictionOutcome {
        EvictionOutcome {
            items_evicted: 0,
            bytes_freed: self.buffers.shrink(),
        }
    }
}

/// Builder assembling a `CacheManager` from explicitly provided components
pub struct CacheManagerBuilder {
    config: CacheConfig,
    compressor: Option<Arc<dyn Compressor>>,
    sampler: Option<Arc<dyn MemorySampler>>,
    events: Option<Arc<dyn EventSink>>,
}

impl CacheManagerBuilder {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            compressor: None,
            sampler: None,
            events: None,
        }
    }

    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn sampler(mut self, sampler: Arc<dyn MemorySampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub async fn build(self) -> Result<Arc<CacheManager>> {
        let config = self.config;
        config.validate()?;

        let storage = PartitionedStore::new(&config.base_dir, config.partitioned_storage.clone());
        storage.init().await?;

        let files = AtomicFile::new(config.atomic_writes.clone());
        for dir in storage.partition_dirs() {
            if let Err(e) = files.sweep_stale(&dir, BACKUP_GRACE_MS).await {
                warn!("Startup sweep of {:?} failed: {}", dir, e);
            }
        }

        let compressor = match self.compressor {
            Some(compressor) => compressor,
            None => {
                let inline = Arc::new(InlineCompressor::new(config.compression.clone()));
                if config.compression.use_workers {
                    Arc::new(PooledCompressor::new(inline)) as Arc<dyn Compressor>
                } else {
                    inline as Arc<dyn Compressor>
                }
            }
        };

        let sampler = self
            .sampler
            .unwrap_or_else(|| Arc::new(SystemMemorySampler));
        let monitor = Arc::new(MemoryMonitor::new(config.memory_pressure.clone(), sampler));

        let memory = Arc::new(MemoryTier::new(config.max_memory_entries));
        let buffers = Arc::new(BufferPool::default());

        {
            let tier = memory.clone();
            let pool = buffers.clone();
            monitor.set_heap_probe(Arc::new(move || {
                tier.total_bytes() + pool.stats().pooled_bytes
            }));
        }
        if config.memory_pressure.auto_eviction {
            monitor.register_strategy(Arc::new(MemoryTierStrategy {
                tier: memory.clone(),
            }));
            monitor.register_strategy(Arc::new(BufferPoolStrategy {
                buffers: buffers.clone(),
            }));
        }
        {
            let pool = buffers.clone();
            monitor.register_reclaim_hook(Arc::new(move || pool.shrink()));
        }

        info!(
            "Cache manager initialized: base_dir={:?}, partitions={}, max_memory_entries={}",
            config.base_dir,
            storage.partition_count(),
            config.max_memory_entries
        );

        Ok(Arc::new(CacheManager {
            breaker: CircuitBreaker::new("disk", config.circuit_breaker.clone()),
            batch: BatchProcessor::new(config.batch_config()),
            checksums: ChecksumValidator::new(config.checksum.clone()),
            counters: Counters {
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                disk_reads: AtomicU64::new(0),
                disk_writes: AtomicU64::new(0),
                invalidated: AtomicU64::new(0),
                rejected_oversize: AtomicU64::new(0),
            },
            memory,
            storage,
            files,
            compressor,
            buffers,
            monitor,
            events: self.events,
            config,
        }))
    }
}

/// Two-tier cache engine entry point.
///
/// Operations on the same key issued concurrently are not serialized against
/// each other; the memory tier is last-write-wins and disk writes are atomic
/// but unordered. Callers needing per-key mutual exclusion serialize at the
/// call site.
pub struct CacheManager {
    config: CacheConfig,
    memory: Arc<MemoryTier>,
    storage: PartitionedStore,
    files: AtomicFile,
    breaker: CircuitBreaker,
    compressor: Arc<dyn Compressor>,
    checksums: ChecksumValidator,
    buffers: Arc<BufferPool>,
    monitor: Arc<MemoryMonitor>,
    batch: BatchProcessor,
    events: Option<Arc<dyn EventSink>>,
    counters: Counters,
}

impl CacheManager {
    /// Construct with default components; use [`CacheManagerBuilder`] to
    /// inject alternatives.
    pub async fn new(config: CacheConfig) -> Result<Arc<Self>> {
        CacheManagerBuilder::new(config).build().await
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(sink) = &self.events {
            sink.publish(event);
        }
    }

    fn file_name(&self, key: &str, algorithm: CompressionAlgorithm) -> String {
        let stem = PartitionedStore::sanitize_key(key);
        match algorithm.file_extension() {
            Some(ext) => format!("{}.json.{}", stem, ext),
            None => format!("{}.json", stem),
        }
    }

    fn candidate_paths(&self, key: &str) -> Vec<(PathBuf, CompressionAlgorithm)> {
        READ_CANDIDATES
            .iter()
            .map(|&algo| (self.storage.path_for(key, &self.file_name(key, algo)), algo))
            .collect()
    }

    /// Typed lookup. Returns `Ok(None)` on any miss, including entries
    /// dropped for TTL, input-hash, or integrity reasons.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        input_hash: Option<&str>,
    ) -> Result<Option<T>> {
        match self.get_value(key, input_hash).await {
            Some(value) => {
                let typed = serde_json::from_value(value)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
                Ok(Some(typed))
            }
            None => Ok(None),
        }
    }

    async fn get_value(&self, key: &str, input_hash: Option<&str>) -> Option<Value> {
        if !self.config.enabled {
            return None;
        }

        match self.memory.get(key, input_hash) {
            TierLookup::Hit(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.data);
            }
            TierLookup::Expired => {
                // The disk copy carries the same timestamp and TTL
                self.delete_disk(key).await;
                self.emit(CacheEvent::Expired {
                    key: key.to_string(),
                });
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            TierLookup::HashMismatch => {
                self.invalidate(key, "input hash mismatch").await;
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            TierLookup::Miss => {}
        }

        match self.read_through_breaker(key).await {
            Some(mut entry) => {
                let now = now_millis();
                if entry.is_expired(now) {
                    self.delete_disk(key).await;
                    self.emit(CacheEvent::Expired {
                        key: key.to_string(),
                    });
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                if !entry.matches_input_hash(input_hash) {
                    self.invalidate(key, "input hash mismatch").await;
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }

                entry.touch();
                let data = entry.data.clone();
                for (evicted_key, bytes) in self.memory.insert(key.to_string(), entry) {
                    self.emit(CacheEvent::Evicted {
                        key: evicted_key,
                        bytes_freed: bytes,
                    });
                }
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(data)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Read the first on-disk variant of `key` through the circuit breaker
    /// and fully validate it. Invalid files are removed.
    async fn read_through_breaker(&self, key: &str) -> Option<CacheEntry> {
        for (path, algorithm) in self.candidate_paths(key) {
            let read = self
                .breaker
                .call("disk_read", || async {
                    match fs::read(&path).await {
                        Ok(bytes) => Ok(Some(bytes)),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                        Err(e) => Err(CacheError::from(e)),
                    }
                })
                .await;

            let bytes = match read {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) if e.is_rejection() => {
                    debug!("Disk read for '{}' rejected, memory-only: {}", key, e);
                    return None;
                }
                Err(e) => {
                    warn!("Disk read for '{}' failed: {}", key, e);
                    return None;
                }
            };

            self.counters.disk_reads.fetch_add(1, Ordering::Relaxed);
            match self.decode_entry(&bytes, algorithm).await {
                Ok(entry) => {
                    let payload = match serde_json::to_vec(&entry.data) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!("Entry for '{}' unserializable: {}", key, e);
                            self.invalidate(key, "unserializable payload").await;
                            return None;
                        }
                    };
                    let report = self.checksums.validate(&payload, &entry.checksum);
                    if !report.is_valid {
                        warn!(
                            "Integrity failure for '{}': {}",
                            key,
                            report.errors.join("; ")
                        );
                        self.invalidate(key, "checksum mismatch").await;
                        return None;
                    }
                    return Some(entry);
                }
                Err(e) => {
                    warn!("Corrupt cache file {:?}: {}", path, e);
                    self.invalidate(key, "corrupt file").await;
                    return None;
                }
            }
        }
        None
    }

    async fn decode_entry(
        &self,
        bytes: &[u8],
        algorithm: CompressionAlgorithm,
    ) -> Result<CacheEntry> {
        let raw = match algorithm {
            CompressionAlgorithm::None => bytes.to_vec(),
            algo => self.compressor.decompress(bytes, algo).await?.data,
        };
        let entry: CacheEntry = serde_json::from_slice(&raw)?;
        Ok(entry)
    }

    /// Typed write. Oversize payloads are skipped (logged), never an error.
    /// An explicit `ttl_ms` overrides the configured default TTL.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_ms: Option<u64>,
        input_hash: Option<String>,
    ) -> Result<()> {
        let value_json =
            serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.set_value(key, value_json, ttl_ms, input_hash).await
    }

    async fn set_value(
        &self,
        key: &str,
        value_json: Value,
        ttl_ms: Option<u64>,
        input_hash: Option<String>,
    ) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let mut payload = self.buffers.acquire(1024);
        if let Err(e) = serde_json::to_writer(&mut payload, &value_json) {
            self.buffers.release(payload);
            return Err(CacheError::Serialization(e.to_string()));
        }
        let size = payload.len();

        if size > self.config.max_entry_bytes {
            warn!(
                "Skipping cache write for '{}': {} bytes exceeds max {}",
                key, size, self.config.max_entry_bytes
            );
            self.counters
                .rejected_oversize
                .fetch_add(1, Ordering::Relaxed);
            self.buffers.release(payload);
            return Ok(());
        }

        let checksum = self.checksums.calculate(&payload, None);
        self.buffers.release(payload);

        let compress = self.compressor.should_compress(size);

        let now = now_millis();
        let entry = CacheEntry {
            data: value_json,
            timestamp: now,
            hash: input_hash,
            size,
            compressed: compress,
            access_count: 0,
            last_accessed: now,
            ttl: ttl_ms.or(self.config.default_ttl_ms),
            checksum,
        };

        // Memory tier first, so readers see the value without waiting on disk
        for (evicted_key, bytes) in self.memory.insert(key.to_string(), entry.clone()) {
            self.emit(CacheEvent::Evicted {
                key: evicted_key,
                bytes_freed: bytes,
            });
        }
        self.emit(CacheEvent::Created {
            key: key.to_string(),
            size,
            compressed: compress,
        });

        self.persist(key, &entry, compress).await;
        Ok(())
    }

    async fn persist(&self, key: &str, entry: &CacheEntry, compress: bool) {
        let envelope = match serde_json::to_vec(entry) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Envelope serialization for '{}' failed: {}", key, e);
                return;
            }
        };

        let (bytes, algorithm) = if compress {
            match self.compressor.compress(&envelope).await {
                Ok(outcome) => (outcome.data, self.compressor.algorithm()),
                Err(e) => {
                    warn!(
                        "Compression for '{}' failed ({}), storing uncompressed",
                        key, e
                    );
                    (envelope, CompressionAlgorithm::None)
                }
            }
        } else {
            (envelope, CompressionAlgorithm::None)
        };

        let path = self.storage.path_for(key, &self.file_name(key, algorithm));
        let write = self
            .breaker
            .call("disk_write", || async {
                self.files.write(&path, &bytes).await
            })
            .await;

        match write {
            Ok(()) => {
                self.counters.disk_writes.fetch_add(1, Ordering::Relaxed);
                // Drop variants left over from a different compression choice
                for (stale, algo) in self.candidate_paths(key) {
                    if algo != algorithm {
                        let _ = self.files.delete(&stale).await;
                    }
                }
            }
            Err(e) if e.is_rejection() => {
                debug!("Persist for '{}' rejected, memory-only: {}", key, e);
            }
            Err(e) => {
                warn!("Persist for '{}' failed: {}", key, e);
            }
        }
    }

    /// Remove a key from both tiers. Missing files are not errors.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.memory.remove(key);
        self.delete_disk(key).await;
        Ok(())
    }

    async fn delete_disk(&self, key: &str) {
        for (path, _) in self.candidate_paths(key) {
            if let Err(e) = self.files.delete(&path).await {
                debug!("Delete of {:?} failed: {}", path, e);
            }
        }
    }

    async fn invalidate(&self, key: &str, reason: &str) {
        self.counters.invalidated.fetch_add(1, Ordering::Relaxed);
        self.memory.remove(key);
        self.delete_disk(key).await;
        self.emit(CacheEvent::Invalidated {
            key: key.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Cheap membership test: memory-tier validity, then a disk existence
    /// probe. A following `get` still performs full validation.
    pub async fn has(&self, key: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        if self.memory.contains_valid(key) {
            return true;
        }

        for (path, _) in self.candidate_paths(key) {
            let exists = self
                .breaker
                .call("disk_probe", || async {
                    Ok(fs::try_exists(&path).await.unwrap_or(false))
                })
                .await;
            if matches!(exists, Ok(true)) {
                return true;
            }
            if exists.is_err() {
                return false;
            }
        }
        false
    }

    /// Drop both tiers entirely. Best-effort on disk.
    pub async fn clear(&self) -> Result<()> {
        let dropped = self.memory.clear();
        info!("Cache cleared: {} memory entries dropped", dropped);

        for dir in self.storage.partition_dirs() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                if entry
                    .file_type()
                    .await
                    .map(|t| t.is_file())
                    .unwrap_or(false)
                {
                    let _ = fs::remove_file(entry.path()).await;
                }
            }
        }
        Ok(())
    }

    /// Scan every partition, validating each entry file. Corrupt and expired
    /// files are removed.
    pub async fn verify(&self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        let now = now_millis();

        for dir in self.storage.partition_dirs() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Ok(Some(dir_entry)) = entries.next_entry().await {
                let path = dir_entry.path();
                let name = dir_entry.file_name().to_string_lossy().into_owned();
                if name.contains(".tmp.") || name.contains(".backup.") {
                    continue;
                }
                let algorithm = match Self::algorithm_for_name(&name) {
                    Some(algorithm) => algorithm,
                    None => continue,
                };

                report.scanned += 1;
                let size = fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

                let verdict = match fs::read(&path).await {
                    Ok(bytes) => match self.decode_entry(&bytes, algorithm).await {
                        Ok(entry) => {
                            if entry.is_expired(now) {
                                Some("expired")
                            } else {
                                let payload = serde_json::to_vec(&entry.data).unwrap_or_default();
                                if self.checksums.validate(&payload, &entry.checksum).is_valid {
                                    None
                                } else {
                                    Some("corrupt")
                                }
                            }
                        }
                        Err(_) => Some("corrupt"),
                    },
                    Err(_) => Some("corrupt"),
                };

                match verdict {
                    None => report.valid += 1,
                    Some(kind) => {
                        if kind == "expired" {
                            report.expired += 1;
                        } else {
                            report.corrupt += 1;
                        }
                        if self.files.delete(&path).await.unwrap_or(false) {
                            report.removed += 1;
                            report.bytes_reclaimed += size;
                        }
                    }
                }
            }
        }

        info!(
            "Verify: {} scanned, {} valid, {} expired, {} corrupt, {} removed",
            report.scanned, report.valid, report.expired, report.corrupt, report.removed
        );
        Ok(report)
    }

    fn algorithm_for_name(name: &str) -> Option<CompressionAlgorithm> {
        if name.ends_with(".json") {
            Some(CompressionAlgorithm::None)
        } else {
            name.rsplit('.')
                .next()
                .and_then(CompressionAlgorithm::from_extension)
        }
    }

    /// Execute a batch of operations under bounded concurrency
    pub async fn process_batch(self: &Arc<Self>, operations: Vec<BatchOperation>) -> Vec<BatchResult> {
        let manager = self.clone();
        self.batch
            .process(operations, move |op| {
                let manager = manager.clone();
                async move {
                    match op {
                        BatchOperation::Get { key, input_hash } => {
                            Ok(manager.get_value(&key, input_hash.as_deref()).await)
                        }
                        BatchOperation::Set {
                            key,
                            data,
                            ttl_ms,
                            input_hash,
                        } => {
                            manager.set_value(&key, data, ttl_ms, input_hash).await?;
                            Ok(None)
                        }
                        BatchOperation::Delete { key } => {
                            manager.delete(&key).await?;
                            Ok(None)
                        }
                        BatchOperation::Has { key } => {
                            Ok(Some(Value::Bool(manager.has(&key).await)))
                        }
                    }
                }
            })
            .await
    }

    /// Start the memory pressure monitor and the periodic pool maintenance
    /// tick. Handles run until dropped or aborted.
    pub fn start_background_tasks(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = vec![self.monitor.start()];

        let buffers = self.buffers.clone();
        let interval_ms = self.config.background_workers.flush_interval_ms;
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                buffers.shrink();
            }
        }));

        handles
    }

    /// Stats snapshot for the external metrics collaborator
    pub fn stats(&self) -> CacheStats {
        let tier = self.memory.stats();
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            memory_entries: tier.entries,
            memory_bytes: tier.total_bytes,
            max_memory_entries: tier.max_entries,
            evictions: tier.evictions,
            expirations: tier.expirations,
            disk_reads: self.counters.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.counters.disk_writes.load(Ordering::Relaxed),
            invalidated: self.counters.invalidated.load(Ordering::Relaxed),
            rejected_oversize: self.counters.rejected_oversize.load(Ordering::Relaxed),
            compression: self.compressor.totals(),
            buffers: self.buffers.stats(),
            breaker: self.breaker.stats(),
            batch: self.batch.stats(),
            pressure: self.monitor.current_level(),
        }
    }

    /// Per-shard file counts for balance diagnostics
    pub async fn partition_info(&self) -> Result<Vec<PartitionInfo>> {
        self.storage.all_partition_info().await
    }

    /// 1.0 means a perfectly even shard spread
    pub async fn balance_score(&self) -> Result<f64> {
        let infos = self.storage.all_partition_info().await?;
        Ok(PartitionedStore::balance_score(&infos))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// One manual memory-pressure check (normally driven by the background
    /// monitor)
    pub fn check_memory_pressure(&self) -> PressureLevel {
        self.monitor.check()
    }
}
