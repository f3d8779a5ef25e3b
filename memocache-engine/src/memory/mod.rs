//! Memory Pressure Detector
//!
//! Samples process memory on a fixed interval, classifies pressure into
//! NORMAL/WARNING/CRITICAL, and drives registered eviction strategies when
//! pressure rises. Strategy invocations are throttled by a cooldown; the
//! allocator-reclaim hint on CRITICAL is throttled independently.

pub mod eviction;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::{MemoryStats, PressureLevel, now_millis};
pub use eviction::{EvictionOutcome, EvictionStrategy};

/// Memory pressure configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryPressureConfig {
    /// Usage fraction at which pressure becomes WARNING
    pub warning_threshold: f64,
    /// Usage fraction at which pressure becomes CRITICAL
    pub critical_threshold: f64,
    pub monitoring_interval_ms: u64,
    /// Invoke eviction strategies automatically under pressure
    pub auto_eviction: bool,
    /// Memory ceiling the usage fraction is computed against
    pub max_memory_bytes: usize,
    /// Minimum time between eviction sweeps
    pub eviction_cooldown_ms: u64,
    /// Minimum time between allocator-reclaim hints
    pub reclaim_cooldown_ms: u64,
    /// Samples retained for diagnostics
    pub history_size: usize,
}

impl Default for MemoryPressureConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 0.75,
            critical_threshold: 0.90,
            monitoring_interval_ms: 5_000,
            auto_eviction: true,
            max_memory_bytes: 512 * 1024 * 1024,
            eviction_cooldown_ms: 30_000,
            reclaim_cooldown_ms: 60_000,
            history_size: 60,
        }
    }
}

/// Source of raw memory readings. Injectable so tests can script samples.
pub trait MemorySampler: Send + Sync {
    /// `(rss_bytes, available_bytes)`, or `None` when the platform probe
    /// fails
    fn sample(&self) -> Option<(usize, usize)>;
}

/// Platform sampler backed by `sys_info`
pub struct SystemMemorySampler;

impl MemorySampler for SystemMemorySampler {
    fn sample(&self) -> Option<(usize, usize)> {
        match sys_info::mem_info() {
            Ok(info) => {
                let rss = info.total.saturating_sub(info.avail) as usize * 1024;
                let avail = info.avail as usize * 1024;
                Some((rss, avail))
            }
            Err(e) => {
                warn!("Memory probe failed: {}", e);
                None
            }
        }
    }
}

type HeapProbe = Arc<dyn Fn() -> usize + Send + Sync>;
type ReclaimHook = Arc<dyn Fn() -> usize + Send + Sync>;

/// Periodic memory watcher driving eviction strategies
pub struct MemoryMonitor {
    config: MemoryPressureConfig,
    sampler: Arc<dyn MemorySampler>,
    heap_probe: RwLock<Option<HeapProbe>>,
    strategies: RwLock<Vec<Arc<dyn EvictionStrategy>>>,
    reclaim_hooks: RwLock<Vec<ReclaimHook>>,
    history: Mutex<VecDeque<MemoryStats>>,
    level: Mutex<PressureLevel>,
    last_eviction: Mutex<Option<Instant>>,
    last_reclaim: Mutex<Option<Instant>>,
}

impl MemoryMonitor {
    pub fn new(config: MemoryPressureConfig, sampler: Arc<dyn MemorySampler>) -> Self {
        Self {
            config,
            sampler,
            heap_probe: RwLock::new(None),
            strategies: RwLock::new(Vec::new()),
            reclaim_hooks: RwLock::new(Vec::new()),
            history: Mutex::new(VecDeque::new()),
            level: Mutex::new(PressureLevel::Normal),
            last_eviction: Mutex::new(None),
            last_reclaim: Mutex::new(None),
        }
    }

    /// Probe for the cache's own byte accounting, folded into samples
    pub fn set_heap_probe(&self, probe: HeapProbe) {
        *self.heap_probe.write() = Some(probe);
    }

    /// Strategies run in registration order
    pub fn register_strategy(&self, strategy: Arc<dyn EvictionStrategy>) {
        info!("Registered eviction strategy '{}'", strategy.name());
        self.strategies.write().push(strategy);
    }

    /// Reclaim hooks run on CRITICAL samples, independently throttled
    pub fn register_reclaim_hook(&self, hook: ReclaimHook) {
        self.reclaim_hooks.write().push(hook);
    }

    /// Take one sample and record it in the history ring
    pub fn sample(&self) -> MemoryStats {
        let heap_bytes = self
            .heap_probe
            .read()
            .as_ref()
            .map(|probe| probe())
            .unwrap_or(0);

        let (rss_bytes, available_bytes) = match self.sampler.sample() {
            Some(reading) => reading,
            // Platform probe unavailable: assume 2x overhead over tracked heap
            None => (heap_bytes * 2, 0),
        };

        let stats = MemoryStats {
            heap_bytes,
            rss_bytes,
            available_bytes,
            usage_percentage: if self.config.max_memory_bytes > 0 {
                rss_bytes as f64 / self.config.max_memory_bytes as f64
            } else {
                0.0
            },
            timestamp: now_millis(),
        };

        let mut history = self.history.lock();
        history.push_back(stats);
        while history.len() > self.config.history_size {
            history.pop_front();
        }
        stats
    }

    pub fn classify(&self, stats: &MemoryStats) -> PressureLevel {
        if stats.usage_percentage >= self.config.critical_threshold {
            PressureLevel::Critical
        } else if stats.usage_percentage >= self.config.warning_threshold {
            PressureLevel::Warning
        } else {
            PressureLevel::Normal
        }
    }

    /// One monitoring tick: sample, classify, and react
    pub fn check(&self) -> PressureLevel {
        let stats = self.sample();
        let level = self.classify(&stats);

        let previous = {
            let mut current = self.level.lock();
            std::mem::replace(&mut *current, level)
        };

        if level != previous {
            info!(
                "Memory pressure {:?} -> {:?} (usage {:.1}%)",
                previous,
                level,
                stats.usage_percentage * 100.0
            );
        }

        let rising_transition = level != previous && level > PressureLevel::Normal;
        if self.config.auto_eviction && (rising_transition || level == PressureLevel::Critical) {
            self.maybe_evict(level, &stats);
        }

        if level == PressureLevel::Critical {
            self.maybe_reclaim();
        }

        level
    }

    pub fn current_level(&self) -> PressureLevel {
        *self.level.lock()
    }

    pub fn history(&self) -> Vec<MemoryStats> {
        self.history.lock().iter().copied().collect()
    }

    fn cooldown_elapsed(last: &Mutex<Option<Instant>>, cooldown_ms: u64) -> bool {
        let mut last = last.lock();
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < Duration::from_millis(cooldown_ms) => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    fn maybe_evict(&self, level: PressureLevel, stats: &MemoryStats) {
        if !Self::cooldown_elapsed(&self.last_eviction, self.config.eviction_cooldown_ms) {
            debug!("Eviction suppressed by cooldown");
            return;
        }

        let strategies = self.strategies.read().clone();
        let mut total = EvictionOutcome::default();
        for strategy in strategies {
            let outcome = strategy.evict(level, stats);
            info!(
                "Eviction strategy '{}': {} items, {} bytes freed",
                strategy.name(),
                outcome.items_evicted,
                outcome.bytes_freed
            );
            total.items_evicted += outcome.items_evicted;
            total.bytes_freed += outcome.bytes_freed;

            // Stop early once pressure is back under the warning line
            let current = self.sample();
            if current.usage_percentage < self.config.warning_threshold {
                break;
            }
        }
        debug!(
            "Eviction sweep done: {} items, {} bytes",
            total.items_evicted, total.bytes_freed
        );
    }

    fn maybe_reclaim(&self) {
        if !Self::cooldown_elapsed(&self.last_reclaim, self.config.reclaim_cooldown_ms) {
            return;
        }
        let hooks = self.reclaim_hooks.read().clone();
        let freed: usize = hooks.iter().map(|hook| hook()).sum();
        debug!("Allocator reclaim hint freed {} bytes", freed);
    }

    /// Start the periodic monitoring task
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = self.clone();
        let interval_ms = self.config.monitoring_interval_ms;
        info!("Starting memory pressure monitor (interval={}ms)", interval_ms);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                monitor.check();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSampler {
        rss: AtomicUsize,
    }

    impl ScriptedSampler {
        fn new(rss: usize) -> Self {
            Self {
                rss: AtomicUsize::new(rss),
            }
        }

        fn set(&self, rss: usize) {
            self.rss.store(rss, Ordering::SeqCst);
        }
    }

    impl MemorySampler for ScriptedSampler {
        fn sample(&self) -> Option<(usize, usize)> {
            Some((self.rss.load(Ordering::SeqCst), 1024))
        }
    }

    struct CountingStrategy {
        calls: AtomicUsize,
        frees: usize,
        sampler: Arc<ScriptedSampler>,
    }

    impl EvictionStrategy for CountingStrategy {
        fn name(&self) -> &str {
            "counting"
        }

        fn evict(&self, _level: PressureLevel, _stats: &MemoryStats) -> EvictionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Pretend eviction brought usage down
            self.sampler.set(self.frees);
            EvictionOutcome {
                items_evicted: 3,
                bytes_freed: 300,
            }
        }
    }

    fn config() -> MemoryPressureConfig {
        MemoryPressureConfig {
            max_memory_bytes: 1000,
            eviction_cooldown_ms: 0,
            reclaim_cooldown_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_classification_thresholds() {
        let sampler = Arc::new(ScriptedSampler::new(0));
        let monitor = MemoryMonitor::new(config(), sampler.clone());

        sampler.set(500);
        assert_eq!(monitor.check(), PressureLevel::Normal);
        sampler.set(750);
        assert_eq!(monitor.check(), PressureLevel::Warning);
        sampler.set(950);
        assert_eq!(monitor.check(), PressureLevel::Critical);
    }

    #[test]
    fn test_critical_invokes_strategy_and_recovers() {
        let sampler = Arc::new(ScriptedSampler::new(950));
        let monitor = MemoryMonitor::new(config(), sampler.clone());

        let strategy = Arc::new(CountingStrategy {
            calls: AtomicUsize::new(0),
            frees: 100,
            sampler: sampler.clone(),
        });
        monitor.register_strategy(strategy.clone());

        assert_eq!(monitor.check(), PressureLevel::Critical);
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);

        // Usage dropped below warning, next tick is NORMAL with no eviction
        assert_eq!(monitor.check(), PressureLevel::Normal);
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_eviction_cooldown() {
        let sampler = Arc::new(ScriptedSampler::new(950));
        let monitor = MemoryMonitor::new(
            MemoryPressureConfig {
                eviction_cooldown_ms: 60_000,
                ..config()
            },
            sampler.clone(),
        );

        let strategy = Arc::new(CountingStrategy {
            calls: AtomicUsize::new(0),
            frees: 950, // stays critical
            sampler: sampler.clone(),
        });
        monitor.register_strategy(strategy.clone());

        monitor.check();
        monitor.check();
        monitor.check();
        assert_eq!(
            strategy.calls.load(Ordering::SeqCst),
            1,
            "cooldown must suppress repeat sweeps"
        );
    }

    #[test]
    fn test_reclaim_hook_on_critical() {
        let sampler = Arc::new(ScriptedSampler::new(950));
        let monitor = MemoryMonitor::new(config(), sampler);

        let hits = Arc::new(AtomicUsize::new(0));
        let hook_hits = hits.clone();
        monitor.register_reclaim_hook(Arc::new(move || {
            hook_hits.fetch_add(1, Ordering::SeqCst);
            128
        }));

        monitor.check();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sampler_fallback_uses_heap_estimate() {
        struct FailingSampler;
        impl MemorySampler for FailingSampler {
            fn sample(&self) -> Option<(usize, usize)> {
                None
            }
        }

        let monitor = MemoryMonitor::new(config(), Arc::new(FailingSampler));
        monitor.set_heap_probe(Arc::new(|| 400));

        let stats = monitor.sample();
        assert_eq!(stats.heap_bytes, 400);
        assert_eq!(stats.rss_bytes, 800);
    }

    #[test]
    fn test_history_ring_is_bounded() {
        let sampler = Arc::new(ScriptedSampler::new(10));
        let monitor = MemoryMonitor::new(
            MemoryPressureConfig {
                history_size: 5,
                ..config()
            },
            sampler,
        );
        for _ in 0..20 {
            monitor.sample();
        }
        assert_eq!(monitor.history().len(), 5);
    }
}
