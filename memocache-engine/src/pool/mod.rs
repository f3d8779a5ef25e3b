//! Memory Pool Manager
//!
//! Reusable object and buffer pools to reduce allocation churn on the
//! serialization and compression paths.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Statistics for a pool
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub created: u64,
    pub reused: u64,
    pub released: u64,
    pub dropped: u64,
    pub available: usize,
    /// reused / (created + reused)
    pub hit_rate: f64,
}

/// Generic object pool.
///
/// `acquire` pops a free instance or constructs a new one; `release` resets
/// the instance and returns it to the pool unless the pool is at capacity.
pub struct ObjectPool<T> {
    free: Mutex<Vec<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    reset: Box<dyn Fn(&mut T) + Send + Sync>,
    max_size: usize,
    min_size: usize,
    created: AtomicU64,
    reused: AtomicU64,
    released: AtomicU64,
    dropped: AtomicU64,
}

impl<T> ObjectPool<T> {
    /// Create a pool with a factory and no-op reset
    pub fn new<F>(max_size: usize, min_size: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_reset(max_size, min_size, factory, |_| {})
    }

    /// Create a pool with a factory and a reset applied on every release
    pub fn with_reset<F, R>(max_size: usize, min_size: usize, factory: F, reset: R) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        Self {
            free: Mutex::new(Vec::new()),
            factory: Box::new(factory),
            reset: Box::new(reset),
            max_size,
            min_size,
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            released: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Pop a free instance or construct a new one
    pub fn acquire(&self) -> T {
        if let Some(obj) = self.free.lock().pop() {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return obj;
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        (self.factory)()
    }

    /// Reset and return an instance to the pool; dropped if at capacity
    pub fn release(&self, mut obj: T) {
        (self.reset)(&mut obj);
        let mut free = self.free.lock();
        if free.len() < self.max_size {
            free.push(obj);
            self.released.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Shrink the free list toward the configured minimum.
    /// Returns the number of instances dropped.
    pub fn shrink(&self) -> usize {
        let mut free = self.free.lock();
        let before = free.len();
        free.truncate(self.min_size);
        let dropped = before - free.len();
        if dropped > 0 {
            self.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
            debug!("Object pool shrunk: dropped {} instances", dropped);
        }
        dropped
    }

    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    pub fn stats(&self) -> PoolStats {
        let created = self.created.load(Ordering::Relaxed);
        let reused = self.reused.load(Ordering::Relaxed);
        let total = created + reused;
        PoolStats {
            created,
            reused,
            released: self.released.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            available: self.free.lock().len(),
            hit_rate: if total > 0 {
                reused as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Power-of-four size classes for scratch buffers
const SIZE_CLASSES: [usize; 5] = [4 * 1024, 16 * 1024, 64 * 1024, 256 * 1024, 1024 * 1024];

/// Buffers retained per size class
const MAX_PER_CLASS: usize = 8;

/// Buffer pool statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct BufferPoolStats {
    pub created: u64,
    pub reused: u64,
    pub hit_rate: f64,
    pub pooled_buffers: usize,
    pub pooled_bytes: usize,
}

/// Size-classed `Vec<u8>` pool for serialization/compression scratch space.
///
/// Requests larger than the biggest class are allocated directly and never
/// pooled on release.
pub struct BufferPool {
    classes: Vec<Mutex<Vec<Vec<u8>>>>,
    min_per_class: usize,
    created: AtomicU64,
    reused: AtomicU64,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(1)
    }
}

impl BufferPool {
    pub fn new(min_per_class: usize) -> Self {
        Self {
            classes: SIZE_CLASSES.iter().map(|_| Mutex::new(Vec::new())).collect(),
            min_per_class,
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    fn class_for(capacity_hint: usize) -> Option<usize> {
        SIZE_CLASSES.iter().position(|&c| c >= capacity_hint)
    }

    /// Get an empty buffer with at least `capacity_hint` capacity
    pub fn acquire(&self, capacity_hint: usize) -> Vec<u8> {
        if let Some(idx) = Self::class_for(capacity_hint) {
            if let Some(buf) = self.classes[idx].lock().pop() {
                self.reused.fetch_add(1, Ordering::Relaxed);
                return buf;
            }
            self.created.fetch_add(1, Ordering::Relaxed);
            return Vec::with_capacity(SIZE_CLASSES[idx]);
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        Vec::with_capacity(capacity_hint)
    }

    /// Clear and return a buffer to its size class
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        // Largest class that fits entirely inside this buffer's capacity
        let idx = SIZE_CLASSES
            .iter()
            .rposition(|&c| c <= buf.capacity());
        if let Some(idx) = idx {
            let mut class = self.classes[idx].lock();
            if class.len() < MAX_PER_CLASS {
                class.push(buf);
            }
        }
    }

    /// Trim every size class down to the configured minimum.
    /// Returns bytes freed.
    pub fn shrink(&self) -> usize {
        let mut freed = 0;
        for class in &self.classes {
            let mut bufs = class.lock();
            while bufs.len() > self.min_per_class {
                if let Some(buf) = bufs.pop() {
                    freed += buf.capacity();
                }
            }
        }
        if freed > 0 {
            debug!("Buffer pool shrunk: freed {} bytes", freed);
        }
        freed
    }

    pub fn stats(&self) -> BufferPoolStats {
        let created = self.created.load(Ordering::Relaxed);
        let reused = self.reused.load(Ordering::Relaxed);
        let total = created + reused;
        let mut pooled_buffers = 0;
        let mut pooled_bytes = 0;
        for class in &self.classes {
            let bufs = class.lock();
            pooled_buffers += bufs.len();
            pooled_bytes += bufs.iter().map(|b| b.capacity()).sum::<usize>();
        }
        BufferPoolStats {
            created,
            reused,
            hit_rate: if total > 0 {
                reused as f64 / total as f64
            } else {
                0.0
            },
            pooled_buffers,
            pooled_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_pool_reuse() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::with_reset(4, 0, Vec::new, |v| v.clear());

        let mut a = pool.acquire();
        a.extend_from_slice(b"hello");
        pool.release(a);

        let b = pool.acquire();
        assert!(b.is_empty(), "released object must be reset");

        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_object_pool_capacity_cap() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(2, 0, Vec::new);

        pool.release(Vec::new());
        pool.release(Vec::new());
        pool.release(Vec::new()); // over capacity, dropped

        assert_eq!(pool.available(), 2);
        assert_eq!(pool.stats().dropped, 1);
    }

    #[test]
    fn test_object_pool_shrink() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(8, 1, Vec::new);
        for _ in 0..5 {
            pool.release(Vec::new());
        }
        let dropped = pool.shrink();
        assert_eq!(dropped, 4);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_buffer_pool_size_classes() {
        let pool = BufferPool::new(0);

        let buf = pool.acquire(10_000);
        assert!(buf.capacity() >= 16 * 1024, "rounded up to the 16KB class");
        pool.release(buf);

        let buf2 = pool.acquire(10_000);
        assert!(buf2.is_empty());
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn test_buffer_pool_oversize_not_pooled() {
        let pool = BufferPool::new(0);
        let buf = pool.acquire(4 * 1024 * 1024);
        assert!(buf.capacity() >= 4 * 1024 * 1024);
        pool.release(buf);
        // Oversize buffers land in the largest class they cover
        let stats = pool.stats();
        assert!(stats.pooled_buffers <= 1);
    }

    #[test]
    fn test_buffer_pool_shrink() {
        let pool = BufferPool::new(0);
        for _ in 0..4 {
            pool.release(pool.acquire(4096));
        }
        assert!(pool.stats().pooled_buffers > 0);
        let freed = pool.shrink();
        assert!(freed > 0);
        assert_eq!(pool.stats().pooled_buffers, 0);
    }
}
