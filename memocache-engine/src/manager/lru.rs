use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::core::{CacheEntry, now_millis};

/// Outcome of a memory-tier lookup
#[derive(Debug)]
pub enum TierLookup {
    /// Valid entry; access metadata already updated
    Hit(CacheEntry),
    /// Entry was present but past its TTL; it has been removed
    Expired,
    /// Entry was present but its stored hash does not match the caller's
    /// input hash; it has been removed
    HashMismatch,
    Miss,
}

/// Memory tier statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryTierStats {
    pub entries: usize,
    pub max_entries: usize,
    pub total_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

struct TierInner {
    data: HashMap<String, CacheEntry>,
    /// LRU ordering (most recent at back)
    lru_order: VecDeque<String>,
    total_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// Bounded in-memory LRU tier. Never exceeds its configured entry cap.
pub struct MemoryTier {
    inner: Mutex<TierInner>,
    max_entries: usize,
}

impl MemoryTier {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(TierInner {
                data: HashMap::new(),
                lru_order: VecDeque::new(),
                total_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
            max_entries,
        }
    }

    /// Look a key up, enforcing TTL and input-hash validity. Invalid entries
    /// are removed as a side effect.
    pub fn get(&self, key: &str, input_hash: Option<&str>) -> TierLookup {
        let mut inner = self.inner.lock();
        let now = now_millis();

        let (expired, mismatched) = match inner.data.get(key) {
            Some(entry) => (
                entry.is_expired(now),
                !entry.matches_input_hash(input_hash),
            ),
            None => {
                inner.misses += 1;
                return TierLookup::Miss;
            }
        };

        if expired {
            Self::remove_locked(&mut inner, key);
            inner.expirations += 1;
            inner.misses += 1;
            debug!("Memory tier EXPIRED: {}", key);
            return TierLookup::Expired;
        }

        if mismatched {
            Self::remove_locked(&mut inner, key);
            inner.misses += 1;
            debug!("Memory tier HASH MISMATCH: {}", key);
            return TierLookup::HashMismatch;
        }

        if let Some(entry) = inner.data.get_mut(key) {
            entry.touch();
            let entry = entry.clone();

            // Move to back of LRU (most recent)
            inner.lru_order.retain(|k| k != key);
            inner.lru_order.push_back(key.to_string());

            inner.hits += 1;
            TierLookup::Hit(entry)
        } else {
            inner.misses += 1;
            TierLookup::Miss
        }
    }

    /// TTL-aware membership test that does not disturb LRU order
    pub fn contains_valid(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .data
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now_millis()))
    }

    /// Insert or replace an entry, evicting LRU overflow.
    /// Returns the evicted `(key, size)` pairs.
    pub fn insert(&self, key: String, entry: CacheEntry) -> Vec<(String, usize)> {
        let mut inner = self.inner.lock();
        let entry_size = entry.size;

        if let Some(old) = inner.data.remove(&key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.size);
            inner.lru_order.retain(|k| k != &key);
        }

        let mut evicted = Vec::new();
        while inner.data.len() >= self.max_entries && !inner.lru_order.is_empty() {
            if let Some(evict_key) = inner.lru_order.pop_front() {
                if let Some(old) = inner.data.remove(&evict_key) {
                    inner.evictions += 1;
                    inner.total_bytes = inner.total_bytes.saturating_sub(old.size);
                    debug!("Memory tier EVICT: {}", evict_key);
                    evicted.push((evict_key, old.size));
                }
            }
        }

        inner.data.insert(key.clone(), entry);
        inner.lru_order.push_back(key);
        inner.total_bytes += entry_size;
        evicted
    }

    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        Self::remove_locked(&mut inner, key)
    }

    fn remove_locked(inner: &mut TierInner, key: &str) -> Option<CacheEntry> {
        let removed = inner.data.remove(key);
        if let Some(entry) = &removed {
            inner.lru_order.retain(|k| k != key);
            inner.total_bytes = inner.total_bytes.saturating_sub(entry.size);
        }
        removed
    }

    /// Drop everything; returns the number of entries removed
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.data.len();
        inner.data.clear();
        inner.lru_order.clear();
        inner.total_bytes = 0;
        count
    }

    /// Evict the least-recently-used `fraction` of entries.
    /// Returns `(items_evicted, bytes_freed)`.
    pub fn evict_fraction(&self, fraction: f64) -> (usize, usize) {
        let mut inner = self.inner.lock();
        let target = ((inner.data.len() as f64) * fraction.clamp(0.0, 1.0)).ceil() as usize;

        let mut items = 0;
        let mut bytes = 0;
        for _ in 0..target {
            let Some(key) = inner.lru_order.pop_front() else {
                break;
            };
            if let Some(entry) = inner.data.remove(&key) {
                inner.evictions += 1;
                inner.total_bytes = inner.total_bytes.saturating_sub(entry.size);
                items += 1;
                bytes += entry.size;
            }
        }
        if items > 0 {
            debug!("Memory tier pressure eviction: {} entries, {} bytes", items, bytes);
        }
        (items, bytes)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    pub fn stats(&self) -> MemoryTierStats {
        let inner = self.inner.lock();
        MemoryTierStats {
            entries: inner.data.len(),
            max_entries: self.max_entries,
            total_bytes: inner.total_bytes,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}
