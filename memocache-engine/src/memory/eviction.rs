use crate::core::{MemoryStats, PressureLevel};

/// What one strategy invocation freed
#[derive(Debug, Clone, Copy, Default)]
pub struct EvictionOutcome {
    pub items_evicted: usize,
    pub bytes_freed: usize,
}

/// A pluggable eviction strategy, invoked in registration order while the
/// process is under memory pressure.
pub trait EvictionStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn evict(&self, level: PressureLevel, stats: &MemoryStats) -> EvictionOutcome;
}
